//! Backend trait for the key store.
//!
//! Defines the interface that all storage backends must implement,
//! enabling pluggable storage (memory, journal file, SQLite).

use super::types::{Inserted, OwnerId, Record};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Backend trait for short URL storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Operations on the same key are linearized by the backend; across keys
/// there is no ordering guarantee.
///
/// # Example
///
/// ```ignore
/// use shortener::store::{KeyStore, MemoryStore, Record};
///
/// let store = MemoryStore::new();
/// store.set("1a2b3c4d", Record::new("1a2b3c4d", "https://example.com", 1)).await?;
/// let record = store.get("1a2b3c4d").await?;
/// ```
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    /// Retrieves a record by key.
    ///
    /// Returns `Ok(None)` on a miss; tombstoned records are returned with
    /// `deleted` set.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// Stores a record under `key` if the key is free and reports whether
    /// it was created.
    ///
    /// The check and the write happen as one step, so of several concurrent
    /// writers of the same record exactly one sees `Inserted::Created`. The
    /// stored record's `short_key` is always `key`. Writing a different URL
    /// under an existing key fails with `Error::Conflict` and leaves the
    /// stored record untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict`, or an error if the storage operation fails.
    async fn insert(&self, key: &str, record: Record) -> Result<Inserted>;

    /// Stores a record under `key` if the key is free.
    ///
    /// Writing the same original URL again is a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict`, or an error if the storage operation fails.
    async fn set(&self, key: &str, record: Record) -> Result<()> {
        self.insert(key, record).await.map(|_| ())
    }

    /// Marks the record deleted on behalf of `owner`.
    ///
    /// Deleting an already deleted record owned by `owner` succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for a missing key, `Error::Forbidden` when
    /// `owner` did not create the record.
    async fn delete(&self, key: &str, owner: OwnerId) -> Result<()>;

    /// Lists every record owned by `owner`, tombstones included.
    ///
    /// Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Record>>;

    /// Returns the highest owner present, or 0 for an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn max_owner_id(&self) -> Result<OwnerId>;

    /// Checks that the backend is reachable within `timeout`.
    ///
    /// In-process backends are always reachable.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendUnavailable` if the engine cannot be reached.
    async fn ping(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
