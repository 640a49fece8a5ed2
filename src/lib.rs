//! Storage core for a content-addressed URL shortener.
//!
//! A URL is hashed into a short key and stored as a [`Record`] through one
//! of three interchangeable [`KeyStore`] backends:
//!
//! - [`MemoryStore`]: volatile map
//! - [`LogFileStore`]: map plus a JSON-lines journal replayed at startup
//! - [`RelationalStore`]: SQLite table
//!
//! [`ShortenerService`] picks the backend from [`StorageConfig`] and adds
//! shortening, resolution, owner allocation and pipelined batch deletion.

pub mod config;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod store;

pub use config::{Config, StorageConfig};
pub use error::{Error, Result};
pub use pipeline::DeletionPipeline;
pub use service::{BatchItem, BatchShortened, Outcome, Resolved, Shortened, ShortenerService};
pub use store::{
    BackendKind, Inserted, KeyStore, LogFileStore, MemoryStore, OwnerId, Record, RecoveryLog,
    RelationalStore,
};
