//! Append-only recovery journal for the log-file backend.
//!
//! On-disk format is one JSON object per line:
//!
//! ```text
//! {"uuid":1,"short_url":"1a2b3c4d","original_url":"https://example.com","user_id":1}
//! ```
//!
//! `uuid` is an advisory sequence number assigned at append time. It is not
//! a uniqueness constraint and replay ignores it apart from advancing the
//! counter past it.

use super::backend::KeyStore;
use super::types::{OwnerId, Record};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Advisory sequence number.
    #[serde(rename = "uuid")]
    pub sequence: u64,
    #[serde(rename = "short_url")]
    pub short_key: String,
    pub original_url: String,
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
}

impl LogEntry {
    fn into_record(self) -> Record {
        Record::new(self.short_key, self.original_url, self.owner_id)
    }
}

/// Summary of a replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Non-empty lines read.
    pub lines: usize,
    /// Lines whose key was already bound to a different URL.
    pub conflicts: usize,
}

/// Crash-recoverable append-only journal.
///
/// Appends are serialized by an internal mutex; the sequence counter is only
/// advanced while that mutex is held.
pub struct RecoveryLog {
    path: PathBuf,
    file: Mutex<File>,
    sequence: AtomicU64,
}

impl RecoveryLog {
    /// Opens (or creates) the journal at `path`.
    ///
    /// Creates parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("creating journal directory {}", parent.display()), e)
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(format!("opening journal {}", path.display()), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            sequence: AtomicU64::new(0),
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last sequence number assigned or replayed.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Appends `record` and flushes it to disk before returning.
    ///
    /// Returns the sequence number assigned to the line.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails. The sequence number
    /// is not consumed on failure and a partially written line is truncated.
    pub fn append(&self, record: &Record) -> Result<u64> {
        let mut file = self.file.lock();
        let sequence = self.sequence.load(Ordering::Acquire) + 1;

        let entry = LogEntry {
            sequence,
            short_key: record.short_key.clone(),
            original_url: record.original_url.clone(),
            owner_id: record.owner_id,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let start = file.metadata().map(|meta| meta.len());
        if let Err(e) = write_line(&mut file, &line) {
            if let Ok(len) = start
                && let Err(truncate) = file.set_len(len)
            {
                warn!(path = %self.path.display(), error = %truncate, "Could not truncate torn journal line");
            }
            return Err(Error::io(
                format!("appending to journal {}", self.path.display()),
                e,
            ));
        }

        self.sequence.store(sequence, Ordering::Release);
        debug!(sequence, key = %record.short_key, "Journal append");
        Ok(sequence)
    }

    /// Reads the journal from the start and feeds every line to `sink.set`.
    ///
    /// File order is preserved. Replay does not follow last-writer-wins: a
    /// line whose key is already bound to a different URL is logged and
    /// skipped, so the first write for a key stands, exactly as a live `set`
    /// would behave. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::RecoveryCorrupt` for the first line that is not valid
    /// UTF-8 or not a valid record; nothing after it is applied. Other sink
    /// errors are returned as-is.
    pub async fn replay(&self, sink: &dyn KeyStore) -> Result<ReplayStats> {
        let contents = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::io(format!("reading journal {}", self.path.display()), e))?;

        let mut stats = ReplayStats::default();

        for (index, raw) in contents.split(|byte| *byte == b'\n').enumerate() {
            let line = std::str::from_utf8(raw)
                .map_err(|e| Error::recovery_corrupt(index + 1, e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }

            let entry: LogEntry = serde_json::from_str(line)
                .map_err(|e| Error::recovery_corrupt(index + 1, e.to_string()))?;
            stats.lines += 1;
            self.sequence.fetch_max(entry.sequence, Ordering::AcqRel);

            let key = entry.short_key.clone();
            match sink.set(&key, entry.into_record()).await {
                Ok(()) => {},
                Err(Error::Conflict { .. }) => {
                    warn!(line = index + 1, key = %key, "Skipping journal record for a different URL");
                    stats.conflicts += 1;
                },
                Err(e) => return Err(e),
            }
        }

        info!(
            path = %self.path.display(),
            lines = stats.lines,
            conflicts = stats.conflicts,
            "Journal replayed"
        );
        Ok(stats)
    }
}

fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line)?;
    file.sync_data()
}
