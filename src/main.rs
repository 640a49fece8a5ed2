//! shortener: storage core daemon for a content-addressed URL shortener.
//!
//! Opens the configured backend (replaying the journal when running on the
//! log-file backend), checks it answers, then waits for Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use shortener::config::{Config, Overrides};
use shortener::{ShortenerService, logging};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "shortener")]
#[command(about = "Content-addressed URL shortener storage core")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SHORTENER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database address (file path or :memory:)
    #[arg(short = 'd', long = "database-dsn", env = "DATABASE_DSN")]
    database_address: Option<String>,

    /// Journal file for the log-file backend
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    file_storage_path: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, env = "SHORTENER_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            database_address: self.database_address.clone(),
            file_storage_path: self.file_storage_path.clone(),
            log_json: self.log_json.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    }
    .with_overrides(cli.overrides());

    logging::init(&config.log)?;

    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    let service = ShortenerService::open(&config.storage)
        .await
        .context("Failed to open storage")?;
    service
        .ping()
        .await
        .context("Storage backend is not reachable")?;

    info!(
        backend = %service.backend(),
        max_owner = service.max_owner_id().await?,
        delete_workers = config.storage.delete_workers,
        "Storage ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    drop(service);
    Ok(())
}
