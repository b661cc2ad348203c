//! Transaction log.
//!
//! One immutable entry is appended per save attempt, committed or failed.
//! The log is bounded in memory and can optionally be persisted as JSON
//! lines:
//!
//! ```text
//! {"id":"txn_1700000000000_1a2b3c4d","path":"doc.md","timestamp":1700000000000,"duration_ms":3,"status":"committed","size":5}
//! ```
//!
//! A torn final line (a crash mid-append) is dropped on load; any other
//! unparseable line is reported as corruption.

use crate::error::{StoreError, StoreResult};
use crate::types::{DocPath, TransactionId};
use docvault_storage::DocumentFs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Final status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// The document was written and verified.
    Committed,
    /// The save failed and was rolled back.
    Failed,
}

/// What the automatic rollback of a failed save did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The pre-save snapshot was written back.
    Restored,
    /// A document the failed save had created was removed again.
    Removed,
    /// There was no snapshot; the document was new or left untouched.
    NothingToRestore,
    /// Writing the snapshot back failed; the document may be corrupted.
    Failed,
}

/// Immutable summary of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Transaction id.
    pub id: TransactionId,
    /// Document path.
    pub path: DocPath,
    /// When the transaction started, in Unix milliseconds.
    pub timestamp: u64,
    /// How long the transaction ran.
    pub duration_ms: u64,
    /// Final status.
    pub status: TransactionStatus,
    /// Content size in bytes.
    pub size: u64,
    /// Failure description for failed transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rollback result for failed transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackOutcome>,
}

/// Append-only record of transaction outcomes.
pub struct TransactionLog {
    entries: RwLock<VecDeque<LogEntry>>,
    max_entries: usize,
    fs: Arc<dyn DocumentFs>,
    file: Option<PathBuf>,
}

impl TransactionLog {
    /// Creates an in-memory log.
    pub fn in_memory(fs: Arc<dyn DocumentFs>, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries,
            fs,
            file: None,
        }
    }

    /// Opens a log persisted at `file`, loading existing entries.
    ///
    /// # Errors
    ///
    /// Returns `LogCorruption` if a line other than the last cannot be
    /// parsed, or `IoFailure` if the file cannot be read.
    pub fn open(fs: Arc<dyn DocumentFs>, file: PathBuf, max_entries: usize) -> StoreResult<Self> {
        let mut entries = VecDeque::new();

        if fs.exists(&file) {
            let data = fs.read(&file)?;
            let torn_tail = !data.is_empty() && !data.ends_with(b"\n");
            let text = String::from_utf8_lossy(&data);
            let lines: Vec<&str> = text.lines().collect();

            for (i, line) in lines.iter().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(line) {
                    Ok(entry) => entries.push_back(entry),
                    Err(e) if torn_tail && i + 1 == lines.len() => {
                        warn!(line = i + 1, error = %e, "dropping torn final transaction log line");
                    }
                    Err(e) => return Err(StoreError::log_corruption(i + 1, e.to_string())),
                }
            }

            let excess = entries.len().saturating_sub(max_entries);
            entries.drain(..excess);
            debug!(entries = entries.len(), file = %file.display(), "loaded transaction log");
        }

        Ok(Self {
            entries: RwLock::new(entries),
            max_entries,
            fs,
            file: Some(file),
        })
    }

    /// Appends an entry, persisting it first when the log is on disk.
    ///
    /// When the in-memory bound is exceeded the oldest entry is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted. The entry is
    /// still kept in memory.
    pub fn append(&self, entry: LogEntry) -> StoreResult<()> {
        let mut entries = self.entries.write();

        let persisted = match &self.file {
            Some(file) => serde_json::to_vec(&entry)
                .map_err(StoreError::from)
                .and_then(|mut line| {
                    line.push(b'\n');
                    self.fs.append_synced(file, &line).map_err(StoreError::from)
                }),
            None => Ok(()),
        };

        entries.push_back(entry);
        if entries.len() > self.max_entries {
            entries.pop_front();
        }

        persisted
    }

    /// Returns all entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    /// Returns the entries for `path`, oldest first.
    pub fn entries_for(&self, path: &DocPath) -> Vec<LogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.path == *path)
            .cloned()
            .collect()
    }

    /// Removes entries whose timestamp is before `cutoff` (Unix ms).
    ///
    /// A persisted log is rewritten with write-then-rename so a crash
    /// leaves either the old or the new file.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted log cannot be rewritten. The
    /// in-memory log is left unchanged in that case.
    pub fn prune_before(&self, cutoff: u64) -> StoreResult<usize> {
        let mut entries = self.entries.write();
        let retained: VecDeque<LogEntry> = entries
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect();
        let removed = entries.len() - retained.len();

        if removed == 0 {
            return Ok(0);
        }

        if let Some(file) = &self.file {
            let mut data = Vec::new();
            for entry in &retained {
                data.extend(serde_json::to_vec(entry)?);
                data.push(b'\n');
            }
            let temp = file.with_extension("log.tmp");
            self.fs.write_synced(&temp, &data)?;
            self.fs.rename(&temp, file)?;
        }

        *entries = retained;
        Ok(removed)
    }

    /// Returns the number of entries held in memory.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
