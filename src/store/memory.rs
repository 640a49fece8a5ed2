//! In-memory key store backend.
//!
//! A plain map guarded by a single reader/writer lock. Nothing survives the
//! process; the log-file backend layers a journal on top of it.

use super::backend::KeyStore;
use super::types::{Inserted, OwnerId, Record};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// In-memory key store.
///
/// Single writer, many readers. Ideal for:
/// - Testing and development
/// - Deployments without durable storage configured
/// - The read side of the log-file backend
///
/// # Example
///
/// ```ignore
/// use shortener::store::{KeyStore, MemoryStore, Record};
///
/// let store = MemoryStore::new();
/// store.set("k", Record::new("k", "https://example.com", 1)).await?;
/// ```
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records, tombstones included.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub(crate) fn get_sync(&self, key: &str) -> Option<Record> {
        self.records.read().get(key).cloned()
    }

    /// Inserts `record` under `key` unless the key is taken.
    pub(crate) fn insert_sync(&self, key: &str, mut record: Record) -> Result<Inserted> {
        let mut records = self.records.write();

        if let Some(existing) = records.get(key) {
            if existing.same_target(&record) {
                return Ok(Inserted::Unchanged);
            }
            debug!(key, "Rejecting write for a different URL");
            return Err(Error::conflict(key));
        }

        record.short_key = key.to_string();
        records.insert(key.to_string(), record);
        Ok(Inserted::Created)
    }

    /// Drops a record whose creation could not be made durable.
    pub(crate) fn rollback(&self, key: &str) {
        self.records.write().remove(key);
    }

    pub(crate) fn delete_sync(&self, key: &str, owner: OwnerId) -> Result<()> {
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| Error::not_found(key))?;

        if record.owner_id != owner {
            return Err(Error::forbidden(key, owner));
        }

        record.deleted = true;
        Ok(())
    }

    pub(crate) fn list_by_owner_sync(&self, owner: OwnerId) -> Vec<Record> {
        self.records
            .read()
            .values()
            .filter(|record| record.owner_id == owner)
            .cloned()
            .collect()
    }

    pub(crate) fn max_owner_id_sync(&self) -> OwnerId {
        self.records
            .read()
            .values()
            .map(|record| record.owner_id)
            .max()
            .unwrap_or(0)
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.get_sync(key))
    }

    async fn insert(&self, key: &str, record: Record) -> Result<Inserted> {
        self.insert_sync(key, record)
    }

    async fn delete(&self, key: &str, owner: OwnerId) -> Result<()> {
        self.delete_sync(key, owner)
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Record>> {
        Ok(self.list_by_owner_sync(owner))
    }

    async fn max_owner_id(&self) -> Result<OwnerId> {
        Ok(self.max_owner_id_sync())
    }
}
