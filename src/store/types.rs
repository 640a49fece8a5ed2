//! Core types for the key store.

use serde::{Deserialize, Serialize};

/// Identity of the user that created a record. `0` means no known owner.
pub type OwnerId = u64;

/// A stored short URL.
///
/// Stores hand out clones; the stored copy is only ever changed by the
/// store itself, and then only to set `deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Content-derived lookup key.
    pub short_key: String,
    /// The validated input URL.
    pub original_url: String,
    /// Creator of the record.
    pub owner_id: OwnerId,
    /// Tombstone flag. Never reverts to `false`.
    #[serde(default)]
    pub deleted: bool,
}

impl Record {
    /// Creates a live record.
    pub fn new(
        short_key: impl Into<String>,
        original_url: impl Into<String>,
        owner_id: OwnerId,
    ) -> Self {
        Self {
            short_key: short_key.into(),
            original_url: original_url.into(),
            owner_id,
            deleted: false,
        }
    }

    /// Returns true if `other` claims the same URL.
    pub(crate) fn same_target(&self, other: &Record) -> bool {
        self.original_url == other.original_url
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// Key was free, record stored.
    Created,
    /// Key already held the same URL; nothing changed.
    Unchanged,
}

/// Which backend a store instance runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Volatile map.
    Memory,
    /// Map plus append-only journal.
    LogFile,
    /// SQLite table.
    Relational,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::LogFile => "log-file",
            Self::Relational => "relational",
        };
        f.write_str(name)
    }
}
