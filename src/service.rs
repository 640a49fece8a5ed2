//! High-level `ShortenerService` over the active key store.
//!
//! The service is the single entry point for request handlers. It owns the
//! backend chosen at startup, replays the journal before it is handed out,
//! and layers hashing, validation, owner allocation and batch deletion on
//! top of the five store operations.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::hasher;
use crate::pipeline::DeletionPipeline;
use crate::store::{
    BackendKind, Inserted, KeyStore, LogFileStore, MemoryStore, OwnerId, Record, RecoveryLog,
    RelationalStore,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Whether a shorten call created the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New record stored.
    Created,
    /// The URL was already shortened; nothing was written.
    AlreadyExists,
}

/// Result of shortening one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortened {
    pub key: String,
    pub original_url: String,
    pub outcome: Outcome,
}

/// One entry of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    /// Caller-chosen id echoed back in the response.
    pub correlation_id: String,
    pub original_url: String,
}

/// One entry of a batch shorten response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub key: String,
    pub outcome: Outcome,
}

/// What a short key resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Redirect target.
    Active(String),
    /// The owner deleted this key.
    Gone,
}

struct ServiceInner {
    store: Arc<dyn KeyStore>,
    backend: BackendKind,
    pipeline: DeletionPipeline,
    /// Highest owner id handed out or observed.
    last_owner: AtomicU64,
    ping_timeout: Duration,
}

/// Short URL service.
///
/// `ShortenerService` is `Clone` and can be shared across request tasks.
///
/// # Example
///
/// ```ignore
/// use shortener::{ShortenerService, StorageConfig};
///
/// let service = ShortenerService::open(&StorageConfig::default()).await?;
/// let owner = service.allocate_owner_id();
/// let shortened = service.shorten("https://example.com", owner).await?;
/// service.delete_batch(vec![shortened.key], owner).await?;
/// ```
#[derive(Clone)]
pub struct ShortenerService {
    inner: Arc<ServiceInner>,
}

impl ShortenerService {
    /// Opens the backend selected by `config`.
    ///
    /// A database address selects the relational backend. Otherwise a file
    /// storage path selects the log-file backend, whose journal is replayed
    /// in full before this returns. With neither, records live in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened, or
    /// `Error::RecoveryCorrupt` if the journal holds a malformed line.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let (store, backend): (Arc<dyn KeyStore>, BackendKind) =
            if let Some(address) = config.database_address() {
                info!(address, "Opening relational storage");
                (Arc::new(RelationalStore::open(address)?), BackendKind::Relational)
            } else if let Some(path) = config.file_storage_path() {
                info!(path = %path.display(), "Opening log-file storage");
                let log = RecoveryLog::open(path)?;
                let memory = MemoryStore::new();
                log.replay(&memory).await?;
                (Arc::new(LogFileStore::new(memory, log)), BackendKind::LogFile)
            } else {
                info!("Opening in-memory storage");
                (Arc::new(MemoryStore::new()), BackendKind::Memory)
            };

        Self::assemble(store, backend, config).await
    }

    /// Creates a service over a fresh in-memory store with default settings.
    pub fn memory() -> Self {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryStore::new());
        Self::build(store, BackendKind::Memory, &StorageConfig::default(), 0)
    }

    /// Creates a service over an already prepared backend.
    ///
    /// Use this to plug in a store that was replayed or seeded elsewhere.
    ///
    /// # Errors
    ///
    /// Returns an error if the highest owner id cannot be read.
    pub async fn custom<B: KeyStore>(
        backend: B,
        kind: BackendKind,
        config: &StorageConfig,
    ) -> Result<Self> {
        Self::assemble(Arc::new(backend), kind, config).await
    }

    async fn assemble(
        store: Arc<dyn KeyStore>,
        backend: BackendKind,
        config: &StorageConfig,
    ) -> Result<Self> {
        let max_owner = store.max_owner_id().await?;
        Ok(Self::build(store, backend, config, max_owner))
    }

    fn build(
        store: Arc<dyn KeyStore>,
        backend: BackendKind,
        config: &StorageConfig,
        max_owner: OwnerId,
    ) -> Self {
        let pipeline = DeletionPipeline::new(Arc::clone(&store)).with_workers(config.delete_workers);
        Self {
            inner: Arc::new(ServiceInner {
                store,
                backend,
                pipeline,
                last_owner: AtomicU64::new(max_owner),
                ping_timeout: config.ping_timeout(),
            }),
        }
    }

    /// Backend this service runs on.
    pub fn backend(&self) -> BackendKind {
        self.inner.backend
    }

    /// Retrieves a record by key, tombstones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn get(&self, key: &str) -> Result<Option<Record>> {
        self.inner.store.get(key).await
    }

    /// Stores `record` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` if `key` holds a different URL.
    pub async fn set(&self, key: &str, record: Record) -> Result<()> {
        let owner = record.owner_id;
        self.inner.store.set(key, record).await?;
        self.inner.last_owner.fetch_max(owner, Ordering::AcqRel);
        Ok(())
    }

    /// Marks `key` deleted on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` or `Error::Forbidden`.
    pub async fn delete(&self, key: &str, owner: OwnerId) -> Result<()> {
        self.inner.store.delete(key, owner).await
    }

    /// Lists every record owned by `owner`, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Record>> {
        self.inner.store.list_by_owner(owner).await
    }

    /// Highest owner id present in the store, or 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn max_owner_id(&self) -> Result<OwnerId> {
        self.inner.store.max_owner_id().await
    }

    /// Hands out a fresh owner id.
    ///
    /// Ids are unique per process even under concurrent callers: the counter
    /// starts at the store's highest owner and only moves forward.
    pub fn allocate_owner_id(&self) -> OwnerId {
        let id = self.inner.last_owner.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(owner = id, "Allocated owner id");
        id
    }

    /// Deletes a batch of keys through the deletion pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first failing delete's error. Earlier deletes stay applied.
    pub async fn delete_batch(&self, keys: Vec<String>, owner: OwnerId) -> Result<usize> {
        self.inner.pipeline.delete(keys, owner).await
    }

    /// Validates, hashes and stores `original_url`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` for bad input and `Error::Conflict` if the
    /// derived key already belongs to a different URL.
    pub async fn shorten(&self, original_url: &str, owner: OwnerId) -> Result<Shortened> {
        hasher::validate_url(original_url)?;
        self.shorten_valid(original_url, owner).await
    }

    async fn shorten_valid(&self, original_url: &str, owner: OwnerId) -> Result<Shortened> {
        let key = hasher::hash(original_url);

        let record = Record::new(key.as_str(), original_url, owner);
        let outcome = match self.inner.store.insert(&key, record).await? {
            Inserted::Created => {
                self.inner.last_owner.fetch_max(owner, Ordering::AcqRel);
                Outcome::Created
            },
            Inserted::Unchanged => Outcome::AlreadyExists,
        };

        debug!(key = %key, owner, ?outcome, "Shortened URL");
        Ok(Shortened {
            key,
            original_url: original_url.to_string(),
            outcome,
        })
    }

    /// Shortens several URLs for one owner.
    ///
    /// Every URL is validated before anything is written; writes then happen
    /// in input order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` without writing if any item is invalid,
    /// or the first write error.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchShortened>> {
        for item in &items {
            hasher::validate_url(&item.original_url)?;
        }

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let shortened = self.shorten_valid(&item.original_url, owner).await?;
            results.push(BatchShortened {
                correlation_id: item.correlation_id,
                key: shortened.key,
                outcome: shortened.outcome,
            });
        }
        Ok(results)
    }

    /// Resolves a short key to its redirect target.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for unknown keys.
    pub async fn resolve(&self, key: &str) -> Result<Resolved> {
        match self.get(key).await? {
            Some(record) if record.deleted => Ok(Resolved::Gone),
            Some(record) => Ok(Resolved::Active(record.original_url)),
            None => Err(Error::not_found(key)),
        }
    }

    /// Checks the backend answers within the configured ping timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendUnavailable` on timeout or engine failure.
    pub async fn ping(&self) -> Result<()> {
        self.inner.store.ping(self.inner.ping_timeout).await
    }
}
