//! SQLite-backed key store.
//!
//! Records live in a single `urls` table keyed by `short_url`, with a unique
//! constraint on `original_url`. Unique violations surface as
//! `Error::Conflict`, exactly like the in-memory backend.

use super::backend::KeyStore;
use super::types::{Inserted, OwnerId, Record};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Table holding every record.
pub(crate) const TABLE: &str = "urls";

const CREATE_TABLE: &str = "CREATE TABLE urls (
    short_url    TEXT PRIMARY KEY,
    original_url TEXT NOT NULL UNIQUE,
    user_id      INTEGER NOT NULL,
    is_deleted   INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS urls_user_id ON urls (user_id);";

const SELECT_COLUMNS: &str = "SELECT short_url, original_url, user_id, is_deleted FROM urls";

/// SQLite-backed key store.
///
/// One connection is opened per process and shared by every caller. Blocking
/// SQLite calls run on tokio's blocking pool.
///
/// # Thread Safety
///
/// `RelationalStore` is `Clone`; clones share the same connection.
#[derive(Clone)]
pub struct RelationalStore {
    conn: Arc<Mutex<Connection>>,
}

impl RelationalStore {
    /// Opens the database at `address` and creates the table if absent.
    ///
    /// `address` is a filesystem path, or `:memory:` for a private
    /// in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendUnavailable` if the database cannot be opened,
    /// or an SQL error if the table cannot be created.
    pub fn open(address: &str) -> Result<Self> {
        let conn = if address == ":memory:" {
            Connection::open_in_memory()
        } else {
            let path = Path::new(address);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::io(format!("creating database directory {}", parent.display()), e)
                })?;
            }
            Connection::open(path)
        }
        .map_err(|e| Error::backend_unavailable(format!("opening database {address}: {e}")))?;

        conn.busy_timeout(Duration::from_secs(5))?;
        ensure_table(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn get_sync(&self, key: &str) -> Result<Option<Record>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE short_url = ?1"),
                params![key],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_sync(&self, key: &str, record: &Record) -> Result<Inserted> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO urls (short_url, original_url, user_id) VALUES (?1, ?2, ?3)",
            params![key, record.original_url, record.owner_id],
        );

        match inserted {
            Ok(_) => Ok(Inserted::Created),
            Err(e) if is_unique_violation(&e) => {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT original_url FROM urls WHERE short_url = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;

                match existing {
                    Some(url) if url == record.original_url => Ok(Inserted::Unchanged),
                    _ => {
                        debug!(key, "Unique constraint violated");
                        Err(Error::conflict(key))
                    },
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    fn delete_sync(&self, key: &str, owner: OwnerId) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let stored_owner: Option<OwnerId> = tx
            .query_row(
                "SELECT user_id FROM urls WHERE short_url = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match stored_owner {
            None => return Err(Error::not_found(key)),
            Some(stored) if stored != owner => return Err(Error::forbidden(key, owner)),
            Some(_) => {},
        }

        tx.execute(
            "UPDATE urls SET is_deleted = 1 WHERE short_url = ?1",
            params![key],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list_by_owner_sync(&self, owner: OwnerId) -> Result<Vec<Record>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE user_id = ?1"))?;
        let records = stmt
            .query_map(params![owner], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn max_owner_id_sync(&self) -> Result<OwnerId> {
        let conn = self.conn.lock();
        let max = conn.query_row("SELECT COALESCE(MAX(user_id), 0) FROM urls", [], |row| {
            row.get(0)
        })?;
        Ok(max)
    }

    /// Runs a blocking operation on tokio's blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Error::backend_unavailable(format!("task join error: {e}")))?
    }
}

/// Creates the table unless it exists, tolerating a concurrent creator.
fn ensure_table(conn: &Connection) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![TABLE],
        |row| row.get(0),
    )?;
    if exists {
        return Ok(());
    }

    match conn.execute_batch(CREATE_TABLE) {
        Ok(()) => {
            debug!(table = TABLE, "Created table");
            Ok(())
        },
        Err(e) if is_already_exists(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        short_key: row.get(0)?,
        original_url: row.get(1)?,
        owner_id: row.get(2)?,
        deleted: row.get(3)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn is_already_exists(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("already exists")
    )
}

#[async_trait]
impl KeyStore for RelationalStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let key = key.to_string();
        self.blocking(move |store| store.get_sync(&key)).await
    }

    async fn insert(&self, key: &str, record: Record) -> Result<Inserted> {
        let key = key.to_string();
        self.blocking(move |store| store.insert_sync(&key, &record))
            .await
    }

    async fn delete(&self, key: &str, owner: OwnerId) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |store| store.delete_sync(&key, owner)).await
    }

    async fn list_by_owner(&self, owner: OwnerId) -> Result<Vec<Record>> {
        self.blocking(move |store| store.list_by_owner_sync(owner)).await
    }

    async fn max_owner_id(&self) -> Result<OwnerId> {
        self.blocking(Self::max_owner_id_sync).await
    }

    async fn ping(&self, timeout: Duration) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let check = tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn
                .try_lock_for(timeout)
                .ok_or_else(|| Error::backend_unavailable("database connection busy"))?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| Error::backend_unavailable(e.to_string()))?;
            Ok(())
        });

        match tokio::time::timeout(timeout, check).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::backend_unavailable(format!("task join error: {e}"))),
            Err(_) => Err(Error::backend_unavailable(format!(
                "ping timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_set() {
        let store = RelationalStore::open(":memory:").unwrap();

        store
            .set("k1", Record::new("k1", "https://a.com", 4))
            .await
            .unwrap();
        let record = store.get("k1").await.unwrap().unwrap();
        assert_eq!(record, Record::new("k1", "https://a.com", 4));
    }

    #[tokio::test]
    async fn test_same_url_under_other_key_conflicts() {
        let store = RelationalStore::open(":memory:").unwrap();

        store
            .set("k1", Record::new("k1", "https://a.com", 1))
            .await
            .unwrap();
        let err = store
            .set("k2", Record::new("k2", "https://a.com", 1))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(store.get("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_id_round_trips_through_integer_column() {
        let store = RelationalStore::open(":memory:").unwrap();
        let owner = i64::MAX as OwnerId;

        store
            .set("k1", Record::new("k1", "https://a.com", owner))
            .await
            .unwrap();
        assert_eq!(store.get("k1").await.unwrap().unwrap().owner_id, owner);
        assert_eq!(store.max_owner_id().await.unwrap(), owner);
    }

    #[tokio::test]
    async fn test_owner_id_beyond_integer_range_is_rejected() {
        let store = RelationalStore::open(":memory:").unwrap();

        let err = store
            .set("k1", Record::new("k1", "https://a.com", OwnerId::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sql(_)), "{err}");
        assert!(store.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tombstone_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("urls.db");
        let address = path.to_str().unwrap();

        {
            let store = RelationalStore::open(address).unwrap();
            store
                .set("k1", Record::new("k1", "https://a.com", 1))
                .await
                .unwrap();
            store.delete("k1", 1).await.unwrap();
        }

        let store = RelationalStore::open(address).unwrap();
        assert!(store.get("k1").await.unwrap().unwrap().deleted);
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_table(&conn).unwrap();
        ensure_table(&conn).unwrap();

        // A creator that lost the race sees "already exists" and tolerates it.
        let err = conn.execute_batch(CREATE_TABLE).unwrap_err();
        assert!(is_already_exists(&err));
    }

    #[tokio::test]
    async fn test_ping() {
        let store = RelationalStore::open(":memory:").unwrap();
        store.ping(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_fails_fast_when_connection_is_held() {
        let store = RelationalStore::open(":memory:").unwrap();
        let _held = store.conn.lock();

        let started = std::time::Instant::now();
        let err = store.ping(Duration::from_millis(100)).await.unwrap_err();

        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
