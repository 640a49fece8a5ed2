//! Short URL key store with pluggable backends.
//!
//! Every backend implements [`KeyStore`] with identical semantics:
//!
//! - **MemoryStore**: Volatile map behind a reader/writer lock
//! - **LogFileStore**: Memory plus an append-only JSON-lines journal that is
//!   replayed on startup
//! - **RelationalStore**: SQLite table with a unique constraint on the
//!   original URL
//!
//! # Example
//!
//! ```ignore
//! use shortener::store::{KeyStore, MemoryStore, Record};
//!
//! let store = MemoryStore::new();
//! store.set("1a2b3c4d", Record::new("1a2b3c4d", "https://example.com", 1)).await?;
//! store.delete("1a2b3c4d", 1).await?;
//! assert!(store.get("1a2b3c4d").await?.unwrap().deleted);
//! ```

mod backend;
mod logfile;
mod memory;
mod recovery;
mod relational;
mod types;

#[cfg(test)]
mod tests;

// Re-export the public API
pub use backend::KeyStore;
pub use logfile::LogFileStore;
pub use memory::MemoryStore;
pub use recovery::{LogEntry, RecoveryLog, ReplayStats};
pub use relational::RelationalStore;
pub use types::{BackendKind, Inserted, OwnerId, Record};
