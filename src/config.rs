//! Configuration types for the shortener.
//!
//! Settings are layered, lowest precedence first:
//!
//! - Built-in defaults
//! - An optional TOML file
//! - Command-line flags and environment variables ([`Overrides`])
//!
//! The resulting [`StorageConfig`] decides which backend the service opens.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::DEFAULT_WORKERS;

/// Default backend ping timeout.
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 1000;

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "shortener=info";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub log: LogConfig,
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite path or `:memory:`. Selects the relational backend.
    pub database_address: Option<String>,
    /// Journal path. Selects the log-file backend when no database is set.
    pub file_storage_path: Option<PathBuf>,
    pub ping_timeout_ms: u64,
    pub delete_workers: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_address: None,
            file_storage_path: None,
            ping_timeout_ms: DEFAULT_PING_TIMEOUT_MS,
            delete_workers: DEFAULT_WORKERS,
        }
    }
}

impl StorageConfig {
    /// Database address, if set and non-empty.
    pub fn database_address(&self) -> Option<&str> {
        self.database_address.as_deref().filter(|a| !a.is_empty())
    }

    /// Journal path, if set and non-empty.
    pub fn file_storage_path(&self) -> Option<&Path> {
        self.file_storage_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl LogConfig {
    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

/// Values supplied on the command line or through the environment.
///
/// `None` leaves the file or default value in place.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_address: Option<String>,
    pub file_storage_path: Option<PathBuf>,
    pub log_json: Option<bool>,
}

impl Config {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has an invalid type
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Applies command-line and environment overrides on top of this config.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(address) = overrides.database_address {
            self.storage.database_address = Some(address);
        }
        if let Some(path) = overrides.file_storage_path {
            self.storage.file_storage_path = Some(path);
        }
        if let Some(json) = overrides.log_json {
            self.log.json = json;
        }
        self
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Zero delete workers
    /// - Zero ping timeout
    /// - A journal path that points at a directory
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let storage = &self.storage;

        if storage.delete_workers == 0 {
            errors.push(format!(
                "storage.delete_workers cannot be 0. Set a positive number (default: {DEFAULT_WORKERS})"
            ));
        }

        if storage.ping_timeout_ms == 0 {
            errors.push(format!(
                "storage.ping_timeout_ms cannot be 0 (default: {DEFAULT_PING_TIMEOUT_MS})"
            ));
        }

        if let Some(path) = storage.file_storage_path()
            && path.is_dir()
        {
            errors.push(format!(
                "File storage path is a directory: {}\n  \
                 Expected a journal file path such as /tmp/short-url-db.json",
                path.display()
            ));
        }

        if storage.database_address().is_some() && storage.file_storage_path().is_some() {
            warnings.push(
                "Both database address and file storage path are set\n  \
                 The database wins; the journal file is ignored"
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
