//! Contract tests run against every backend.

use super::*;
use crate::error::Error;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

/// A backend under test plus whatever keeps it alive.
struct Harness {
    store: Arc<dyn KeyStore>,
    _dir: Option<TempDir>,
}

fn memory() -> Harness {
    Harness {
        store: Arc::new(MemoryStore::new()),
        _dir: None,
    }
}

fn log_file() -> Harness {
    let dir = TempDir::new().unwrap();
    let log = RecoveryLog::open(dir.path().join("urls.json")).unwrap();
    Harness {
        store: Arc::new(LogFileStore::new(MemoryStore::new(), log)),
        _dir: Some(dir),
    }
}

fn relational() -> Harness {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.db");
    let store = RelationalStore::open(path.to_str().unwrap()).unwrap();
    Harness {
        store: Arc::new(store),
        _dir: Some(dir),
    }
}

fn all_backends() -> Vec<(&'static str, Harness)> {
    vec![
        ("memory", memory()),
        ("log-file", log_file()),
        ("relational", relational()),
    ]
}

fn record(key: &str, url: &str, owner: OwnerId) -> Record {
    Record::new(key, url, owner)
}

#[tokio::test]
async fn test_idempotent_set() {
    for (name, h) in all_backends() {
        let r = record("h", "https://a.com", 1);
        h.store.set("h", r.clone()).await.unwrap();
        h.store.set("h", r).await.unwrap();

        assert_eq!(h.store.list_by_owner(1).await.unwrap().len(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_insert_reports_created_once() {
    for (name, h) in all_backends() {
        let first = h.store.insert("h", record("h", "https://a.com", 1)).await.unwrap();
        let second = h.store.insert("h", record("h", "https://a.com", 2)).await.unwrap();

        assert_eq!(first, Inserted::Created, "{name}");
        assert_eq!(second, Inserted::Unchanged, "{name}");
        assert_eq!(h.store.get("h").await.unwrap().unwrap().owner_id, 1, "{name}");
    }
}

#[tokio::test]
async fn test_stored_record_carries_lookup_key() {
    for (name, h) in all_backends() {
        h.store
            .set("h", record("mismatched", "https://a.com", 1))
            .await
            .unwrap();

        let stored = h.store.get("h").await.unwrap().unwrap();
        assert_eq!(stored.short_key, "h", "{name}");
        let listed = h.store.list_by_owner(1).await.unwrap();
        assert_eq!(listed[0].short_key, "h", "{name}");
    }
}

#[tokio::test]
async fn test_conflict_detection() {
    for (name, h) in all_backends() {
        h.store
            .set("h", record("h", "https://a.com", 1))
            .await
            .unwrap();
        let err = h
            .store
            .set("h", record("h", "https://b.com", 1))
            .await
            .unwrap_err();

        assert!(err.is_conflict(), "{name}: {err}");
        let stored = h.store.get("h").await.unwrap().unwrap();
        assert_eq!(stored.original_url, "https://a.com", "{name}");
    }
}

#[tokio::test]
async fn test_ownership_checked_delete() {
    for (name, h) in all_backends() {
        h.store
            .set("h", record("h", "https://a.com", 1))
            .await
            .unwrap();

        let err = h.store.delete("h", 2).await.unwrap_err();
        assert!(err.is_forbidden(), "{name}: {err}");
        assert!(!h.store.get("h").await.unwrap().unwrap().deleted, "{name}");

        h.store.delete("h", 1).await.unwrap();
        assert!(h.store.get("h").await.unwrap().unwrap().deleted, "{name}");

        // Already deleted: no-op success.
        h.store.delete("h", 1).await.unwrap();
        assert!(h.store.get("h").await.unwrap().unwrap().deleted, "{name}");
    }
}

#[tokio::test]
async fn test_delete_missing_key() {
    for (name, h) in all_backends() {
        let err = h.store.delete("nope", 1).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{name}: {err}");
    }
}

#[tokio::test]
async fn test_get_missing_key() {
    for (name, h) in all_backends() {
        assert!(h.store.get("nope").await.unwrap().is_none(), "{name}");
    }
}

#[tokio::test]
async fn test_tombstone_keeps_key_reserved() {
    for (name, h) in all_backends() {
        h.store
            .set("h", record("h", "https://a.com", 1))
            .await
            .unwrap();
        h.store.delete("h", 1).await.unwrap();

        let err = h
            .store
            .set("h", record("h", "https://b.com", 2))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{name}: {err}");
        assert!(h.store.get("h").await.unwrap().unwrap().deleted, "{name}");
    }
}

#[tokio::test]
async fn test_list_by_owner_includes_tombstones() {
    for (name, h) in all_backends() {
        h.store
            .set("a", record("a", "https://a.com", 1))
            .await
            .unwrap();
        h.store
            .set("b", record("b", "https://b.com", 1))
            .await
            .unwrap();
        h.store
            .set("c", record("c", "https://c.com", 2))
            .await
            .unwrap();
        h.store.delete("a", 1).await.unwrap();

        let mut keys: Vec<String> = h
            .store
            .list_by_owner(1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.short_key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"], "{name}");
        assert!(h.store.list_by_owner(9).await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_max_owner_id() {
    for (name, h) in all_backends() {
        assert_eq!(h.store.max_owner_id().await.unwrap(), 0, "{name}");

        for (i, owner) in [1, 3, 2].into_iter().enumerate() {
            let key = format!("k{i}");
            let url = format!("https://{i}.com");
            h.store.set(&key, record(&key, &url, owner)).await.unwrap();
        }

        assert_eq!(h.store.max_owner_id().await.unwrap(), 3, "{name}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_on_disjoint_keys() {
    const WRITERS: usize = 32;

    for (name, h) in all_backends() {
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..WRITERS {
            let store = Arc::clone(&h.store);
            tasks.spawn(async move {
                let key = format!("key{i}");
                store
                    .set(&key, Record::new(&key, format!("https://{i}.example"), 1))
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        for i in 0..WRITERS {
            let stored = h.store.get(&format!("key{i}")).await.unwrap();
            assert!(stored.is_some(), "{name}: key{i} missing");
        }
    }
}

#[tokio::test]
async fn test_ping_in_process_backends() {
    for (name, h) in [("memory", memory()), ("log-file", log_file())] {
        h.store
            .ping(std::time::Duration::from_secs(1))
            .await
            .unwrap_or_else(|e| panic!("{name}: {e}"));
    }
}

#[tokio::test]
async fn test_recovery_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.json");
    let urls: Vec<String> = (0..25)
        .map(|i| format!("https://example.com/{i}?q=ünïcödé&n={i}"))
        .collect();

    {
        let store = LogFileStore::new(MemoryStore::new(), RecoveryLog::open(&path).unwrap());
        for (i, url) in urls.iter().enumerate() {
            let key = crate::hasher::hash(url);
            store
                .set(&key, Record::new(&key, url.as_str(), i as OwnerId))
                .await
                .unwrap();
        }
    }

    // Restart: fresh memory, same journal.
    let log = RecoveryLog::open(&path).unwrap();
    let memory = MemoryStore::new();
    let stats = log.replay(&memory).await.unwrap();
    assert_eq!(stats.lines, urls.len());
    assert_eq!(log.sequence(), urls.len() as u64);

    for (i, url) in urls.iter().enumerate() {
        let key = crate::hasher::hash(url);
        let restored = memory.get(&key).await.unwrap().unwrap();
        assert_eq!(restored.original_url.as_bytes(), url.as_bytes());
        assert_eq!(restored.owner_id, i as OwnerId);
    }
}

#[tokio::test]
async fn test_restart_revives_tombstones() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.json");

    {
        let store = LogFileStore::new(MemoryStore::new(), RecoveryLog::open(&path).unwrap());
        store
            .set("k", record("k", "https://a.com", 1))
            .await
            .unwrap();
        store.delete("k", 1).await.unwrap();
    }

    let memory = MemoryStore::new();
    RecoveryLog::open(&path)
        .unwrap()
        .replay(&memory)
        .await
        .unwrap();
    // The journal carries no tombstones.
    assert!(!memory.get("k").await.unwrap().unwrap().deleted);
}

proptest! {
    #[test]
    fn prop_deleted_is_monotonic(ops in prop::collection::vec((0u8..3, 0u64..3), 1..40)) {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            store.set("k", record("k", "https://a.com", 1)).await.unwrap();
            let mut seen_deleted = false;

            for (op, owner) in ops {
                match op {
                    0 => { let _ = store.delete("k", owner).await; },
                    1 => { let _ = store.set("k", record("k", "https://a.com", owner)).await; },
                    _ => { let _ = store.set("k", record("k", "https://b.com", owner)).await; },
                }

                let current = store.get("k").await.unwrap().unwrap();
                prop_assert!(!(seen_deleted && !current.deleted));
                prop_assert_eq!(current.owner_id, 1);
                prop_assert_eq!(current.original_url.as_str(), "https://a.com");
                seen_deleted = current.deleted;
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_max_owner_id_is_max(owners in prop::collection::vec(0u64..1_000, 0..30)) {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            for (i, owner) in owners.iter().enumerate() {
                let key = format!("k{i}");
                store.set(&key, record(&key, &format!("https://{i}.com"), *owner)).await.unwrap();
            }
            let expected = owners.iter().copied().max().unwrap_or(0);
            prop_assert_eq!(store.max_owner_id().await.unwrap(), expected);
            Ok(())
        })?;
    }
}
