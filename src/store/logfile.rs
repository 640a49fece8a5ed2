//! Journal-backed key store.
//!
//! Reads are served from an in-memory map. Every newly created record is
//! appended to the recovery journal before `set` returns. Deletes only touch
//! memory: the journal does not carry tombstones, so a restart revives
//! deleted records.

use super::backend::KeyStore;
use super::memory::MemoryStore;
use super::recovery::RecoveryLog;
use super::types::{Inserted, OwnerId, Record};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Key store backed by memory plus an append-only journal.
///
/// Writers hold one store-wide guard from the in-memory insert until the
/// journal append has succeeded or been rolled back, so no caller observes a
/// record that is not yet durable. Writes run on tokio's blocking pool.
///
/// # Example
///
/// ```ignore
/// use shortener::store::{LogFileStore, MemoryStore, RecoveryLog};
///
/// let log = RecoveryLog::open("/var/lib/shortener/urls.json")?;
/// let memory = MemoryStore::new();
/// log.replay(&memory).await?;
/// let store = LogFileStore::new(memory, log);
/// ```
pub struct LogFileStore {
    inner: Arc<Inner>,
}

struct Inner {
    memory: MemoryStore,
    log: RecoveryLog,
    writes: Mutex<()>,
}

impl LogFileStore {
    /// Wraps an already replayed memory store and its journal.
    pub fn new(memory: MemoryStore, log: RecoveryLog) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory,
                log,
                writes: Mutex::new(()),
            }),
        }
    }

    /// The journal this store appends to.
    pub fn log(&self) -> &RecoveryLog {
        &self.inner.log
    }

    /// Returns the number of records held in memory.
    pub fn len(&self) -> usize {
        self.inner.memory.len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.inner.memory.is_empty()
    }

    /// Runs a write on tokio's blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| Error::backend_unavailable(format!("task join error: {e}")))?
    }
}

impl Inner {
    fn insert_sync(&self, key: &str, record: Record) -> Result<Inserted> {
        let _write = self.writes.lock();

        let mut journaled = record.clone();
        journaled.short_key = key.to_string();
        if self.memory.insert_sync(key, record)? == Inserted::Unchanged {
            return Ok(Inserted::Unchanged);
        }

        if let Err(e) = self.log.append(&journaled) {
            warn!(key, error = %e, "Journal append failed, rolling back");
            self.memory.rollback(key);
            return Err(e);
        }

        Ok(Inserted::Created)
    }

    fn delete_sync(&self, key: &str, owner: OwnerId) -> Result<()> {
        let _write = self.writes.lock();
        self.memory.delete_sync(key, owner)
    }
}

#[async_trait]
impl KeyStore for LogFileStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        Ok(self.inner.memory.get_sync(key))
    }

    async fn insert(&self, key: &str, record: Record) -> Result<Inserted> {
        let key = key.to_string();
        self.blocking(move |inner| inner.insert_sync(&key, record))
            .await
    }

    async fn delete(&self, key: &str, owner: OwnerId) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |inner| inner.delete_sync(&key, owner))
            .await
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Record>> {
        Ok(self.inner.memory.list_by_owner_sync(owner))
    }

    async fn max_owner_id(&self) -> Result<OwnerId> {
        Ok(self.inner.memory.max_owner_id_sync())
    }

    async fn ping(&self, _timeout: Duration) -> Result<()> {
        let path = self.inner.log.path();
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(Error::backend_unavailable(format!(
                "journal {} is not a file",
                path.display()
            ))),
            Err(e) => Err(Error::backend_unavailable(format!(
                "journal {}: {e}",
                path.display()
            ))),
        }
    }
}
