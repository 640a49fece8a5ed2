//! Bounded-concurrency batch deletion.
//!
//! A batch delete runs as a small fan-out/fan-in pipeline:
//!
//! ```text
//! generator ──► shared queue ──► worker × N ──► fan-in ──► orchestrator ──► KeyStore::delete
//! ```
//!
//! Workers pull from one shared queue, so a slow worker never holds keys
//! another could take. Calls into the store are serialized by the
//! orchestrator: one delete in flight at a time. The first failing delete
//! cancels every stage and its error is returned untouched. Deletes applied
//! before the failure are not rolled back.

use crate::error::Result;
use crate::store::{KeyStore, OwnerId};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, warn};

/// Default number of workers per batch.
pub const DEFAULT_WORKERS: usize = 5;

/// Capacity of every hand-off channel; keeps stages in lock-step.
const STAGE_CAPACITY: usize = 1;

/// Applies ownership-checked soft deletes to batches of keys.
///
/// Clones share the serialization lock, so concurrent batches against the
/// same pipeline still reach the store one delete at a time.
///
/// # Example
///
/// ```ignore
/// use shortener::pipeline::DeletionPipeline;
///
/// let pipeline = DeletionPipeline::new(store.clone()).with_workers(8);
/// let deleted = pipeline.delete(vec!["1a2b3c4d".into()], 1).await?;
/// ```
#[derive(Clone)]
pub struct DeletionPipeline {
    store: Arc<dyn KeyStore>,
    workers: usize,
    serialize: Arc<Mutex<()>>,
}

impl DeletionPipeline {
    /// Creates a pipeline with [`DEFAULT_WORKERS`] workers.
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            workers: DEFAULT_WORKERS,
            serialize: Arc::new(Mutex::new(())),
        }
    }

    /// Sets the worker pool width. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Worker pool width.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Deletes every key in `keys` on behalf of `owner`.
    ///
    /// Returns the number of deletes applied, which equals `keys.len()` on
    /// success.
    ///
    /// # Errors
    ///
    /// Returns the first `delete` error (`NotFound`, `Forbidden`, backend
    /// failures) unchanged. Keys after the failing one may or may not have
    /// been processed.
    pub async fn delete(&self, keys: Vec<String>, owner: OwnerId) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let total = keys.len();
        let (done_tx, done_rx) = watch::channel(false);

        let input = generator(done_rx.clone(), keys);
        let outputs = fan_out(done_rx.clone(), input, self.workers);
        let mut merged = fan_in(done_rx, outputs);

        let mut deleted = 0;
        while let Some(key) = merged.recv().await {
            let _serialized = self.serialize.lock().await;
            if let Err(e) = self.store.delete(&key, owner).await {
                warn!(key = %key, owner, error = %e, deleted, total, "Batch delete aborted");
                let _ = done_tx.send(true);
                return Err(e);
            }
            deleted += 1;
        }

        debug!(owner, deleted, "Batch delete finished");
        Ok(deleted)
    }
}

/// Resolves once the done-signal fires or its sender is gone.
async fn cancelled(done: &mut watch::Receiver<bool>) {
    let _ = done.wait_for(|cancelled| *cancelled).await;
}

/// Emits `keys` one at a time until exhausted or cancelled.
fn generator(mut done: watch::Receiver<bool>, keys: Vec<String>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);

    tokio::spawn(async move {
        for key in keys {
            tokio::select! {
                biased;
                () = cancelled(&mut done) => return,
                sent = tx.send(key) => {
                    if sent.is_err() {
                        return;
                    }
                },
            }
        }
    });

    rx
}

/// Starts `workers` relays that all pull from the same `input` queue.
fn fan_out(
    done: watch::Receiver<bool>,
    input: mpsc::Receiver<String>,
    workers: usize,
) -> Vec<mpsc::Receiver<String>> {
    let input = Arc::new(Mutex::new(input));

    (0..workers)
        .map(|_| worker(done.clone(), Arc::clone(&input)))
        .collect()
}

fn worker(
    mut done: watch::Receiver<bool>,
    input: Arc<Mutex<mpsc::Receiver<String>>>,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);

    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                () = cancelled(&mut done) => return,
                next = async { input.lock().await.recv().await } => next,
            };
            let Some(key) = next else { return };

            tokio::select! {
                biased;
                () = cancelled(&mut done) => return,
                sent = tx.send(key) => {
                    if sent.is_err() {
                        return;
                    }
                },
            }
        }
    });

    rx
}

/// Merges worker streams into one; closes after every worker has finished.
fn fan_in(
    done: watch::Receiver<bool>,
    streams: Vec<mpsc::Receiver<String>>,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);

    for mut stream in streams {
        let tx = tx.clone();
        let mut done = done.clone();
        tokio::spawn(async move {
            while let Some(key) = stream.recv().await {
                tokio::select! {
                    biased;
                    () = cancelled(&mut done) => return,
                    sent = tx.send(key) => {
                        if sent.is_err() {
                            return;
                        }
                    },
                }
            }
        });
    }

    rx
}
