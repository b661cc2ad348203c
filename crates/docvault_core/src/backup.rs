//! Per-document backup snapshots.
//!
//! Before a save overwrites a document, its current bytes are copied to
//!
//! ```text
//! <root>/.docvault/backups/{basename}.{transaction_id}.backup
//! ```
//!
//! and indexed in memory with their checksum and creation time. Each
//! document keeps at most `max_backups` snapshots; older ones are evicted
//! first, both from the index and from disk.
//!
//! ## Usage
//!
//! ```ignore
//! let snapshot = backups.snapshot(&path, &resolved, &txn_id)?;
//! // ... write fails ...
//! backups.restore(&path, &resolved, &BackupSelector::Id(txn_id.clone()), &txn_id)?;
//! ```

use crate::checksum::Checksum;
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult, VerifyStage};
use crate::types::{DocPath, TransactionId};
use crate::writer::AtomicWriter;
use docvault_storage::DocumentFs;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extension of backup files.
pub const BACKUP_EXT: &str = "backup";

/// A stored copy of a document taken before a transaction overwrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSnapshot {
    /// The transaction that took the snapshot. Also the backup id.
    pub transaction_id: TransactionId,
    /// The logical document path.
    pub path: DocPath,
    /// Where the document lives on disk.
    pub original_path: PathBuf,
    /// Where the backup bytes live on disk.
    pub backup_path: PathBuf,
    /// Checksum of the backed up bytes.
    pub checksum: Checksum,
    /// Size of the backed up bytes.
    pub size: u64,
    /// When the snapshot was taken, in Unix milliseconds.
    pub created_at: u64,
}

/// A backup descriptor as reported by history queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    /// The snapshot descriptor.
    #[serde(flatten)]
    pub snapshot: BackupSnapshot,
    /// Whether the backup bytes still exist on disk.
    pub available: bool,
}

/// Which backup to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSelector {
    /// The most recent snapshot.
    Latest,
    /// The snapshot taken by a specific transaction.
    Id(TransactionId),
}

impl From<Option<TransactionId>> for BackupSelector {
    fn from(id: Option<TransactionId>) -> Self {
        id.map_or(Self::Latest, Self::Id)
    }
}

/// Maintains bounded backup lists per document.
pub struct BackupStore {
    fs: Arc<dyn DocumentFs>,
    backup_dir: PathBuf,
    writer: AtomicWriter,
    max_backups: usize,
    clock: Arc<dyn Clock>,
    /// Snapshots per path, oldest first. One lock covers appends and
    /// evictions so they never interleave on the same list.
    index: Mutex<HashMap<DocPath, VecDeque<BackupSnapshot>>>,
}

impl BackupStore {
    /// Creates a backup store writing into `backup_dir`.
    pub fn new(
        fs: Arc<dyn DocumentFs>,
        backup_dir: PathBuf,
        writer: AtomicWriter,
        max_backups: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fs,
            backup_dir,
            writer,
            max_backups,
            clock,
            index: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the file a snapshot of `path` by `transaction_id` is stored in.
    #[must_use]
    pub fn backup_path(&self, path: &DocPath, transaction_id: &TransactionId) -> PathBuf {
        self.backup_dir.join(format!(
            "{}.{}.{BACKUP_EXT}",
            path.basename(),
            transaction_id.as_str()
        ))
    }

    /// Copies the current content of `original` aside before `transaction_id`
    /// overwrites it.
    ///
    /// Returns `None` when the document does not exist yet; a first save
    /// has nothing to back up.
    ///
    /// # Errors
    ///
    /// Returns `IoFailure` if the document cannot be read or the backup
    /// cannot be written.
    pub fn snapshot(
        &self,
        path: &DocPath,
        original: &Path,
        transaction_id: &TransactionId,
    ) -> StoreResult<Option<BackupSnapshot>> {
        if !self.fs.exists(original) {
            return Ok(None);
        }

        let bytes = self.fs.read(original)?;
        self.fs.create_dir_all(&self.backup_dir)?;
        let backup_path = self.backup_path(path, transaction_id);
        self.fs.write_synced(&backup_path, &bytes)?;

        let snapshot = BackupSnapshot {
            transaction_id: transaction_id.clone(),
            path: path.clone(),
            original_path: original.to_path_buf(),
            backup_path,
            checksum: Checksum::of(&bytes),
            size: bytes.len() as u64,
            created_at: self.clock.now_millis(),
        };

        self.index
            .lock()
            .entry(path.clone())
            .or_default()
            .push_back(snapshot.clone());

        debug!(%path, txn = %transaction_id, bytes = bytes.len(), "backup snapshot taken");
        Ok(Some(snapshot))
    }

    /// Writes a snapshot's bytes back over `original`.
    ///
    /// The write goes through the atomic writer under `operation_id`, so
    /// the document is never left half restored.
    ///
    /// # Errors
    ///
    /// - `NoBackups` if the document has no snapshots
    /// - `BackupNotFound` if the selected snapshot is unknown
    /// - `MissingBackupBytes` if the snapshot's file is gone
    /// - `ChecksumMismatch` if the backup bytes no longer match
    /// - `IoFailure` if writing the document fails
    pub fn restore(
        &self,
        path: &DocPath,
        original: &Path,
        selector: &BackupSelector,
        operation_id: &TransactionId,
    ) -> StoreResult<BackupSnapshot> {
        let snapshot = self.find(path, selector)?;

        let bytes = match self.fs.read(&snapshot.backup_path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                return Err(StoreError::MissingBackupBytes {
                    path: path.to_string(),
                    backup_path: snapshot.backup_path,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let actual = Checksum::of(&bytes);
        if actual != snapshot.checksum {
            return Err(StoreError::ChecksumMismatch {
                stage: VerifyStage::Backup,
                expected: snapshot.checksum,
                actual,
            });
        }

        self.writer.write_atomic(operation_id, original, &bytes)?;
        info!(%path, backup = %snapshot.transaction_id, "restored document from backup");
        Ok(snapshot)
    }

    /// Looks up a snapshot without touching disk.
    ///
    /// # Errors
    ///
    /// Returns `NoBackups` or `BackupNotFound`.
    pub fn find(&self, path: &DocPath, selector: &BackupSelector) -> StoreResult<BackupSnapshot> {
        let index = self.index.lock();
        let list = index
            .get(path)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| StoreError::NoBackups {
                path: path.to_string(),
            })?;

        let found = match selector {
            BackupSelector::Latest => list.back(),
            BackupSelector::Id(id) => list.iter().rev().find(|s| s.transaction_id == *id),
        };

        found.cloned().ok_or_else(|| StoreError::BackupNotFound {
            path: path.to_string(),
            backup_id: match selector {
                BackupSelector::Id(id) => id.clone(),
                BackupSelector::Latest => TransactionId::from("latest"),
            },
        })
    }

    /// Evicts the oldest snapshots of `path` beyond the retention bound.
    ///
    /// Eviction removes the index entry and the backup file. A file that
    /// cannot be removed is logged and skipped.
    ///
    /// Returns the number of snapshots evicted.
    pub fn prune(&self, path: &DocPath) -> usize {
        let evicted: Vec<BackupSnapshot> = {
            let mut index = self.index.lock();
            let Some(list) = index.get_mut(path) else {
                return 0;
            };
            let excess = list.len().saturating_sub(self.max_backups);
            list.drain(..excess).collect()
        };

        for snapshot in &evicted {
            match self.fs.remove(&snapshot.backup_path) {
                Ok(()) => debug!(%path, backup = %snapshot.transaction_id, "evicted backup"),
                Err(e) => warn!(
                    %path,
                    backup = %snapshot.transaction_id,
                    error = %e,
                    "failed to remove evicted backup, skipping"
                ),
            }
        }

        evicted.len()
    }

    /// Lists the snapshots of `path`, oldest first, with availability.
    pub fn list(&self, path: &DocPath) -> Vec<BackupInfo> {
        let snapshots: Vec<BackupSnapshot> = self
            .index
            .lock()
            .get(path)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default();

        snapshots
            .into_iter()
            .map(|snapshot| BackupInfo {
                available: self.fs.exists(&snapshot.backup_path),
                snapshot,
            })
            .collect()
    }

    /// Returns the number of snapshots held for `path`.
    pub fn count(&self, path: &DocPath) -> usize {
        self.index.lock().get(path).map_or(0, VecDeque::len)
    }

    /// Returns the retention bound.
    #[must_use]
    pub fn max_backups(&self) -> usize {
        self.max_backups
    }
}
