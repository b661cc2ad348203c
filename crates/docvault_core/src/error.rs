//! Error types for DocVault core.

use crate::checksum::Checksum;
use crate::transaction::TransactionState;
use crate::types::TransactionId;
use docvault_storage::StorageError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The point in a save at which two checksums were compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    /// The bytes read back from the staging file.
    Staged,
    /// The bytes read back from the published document.
    Published,
    /// The bytes read from a backup before restoring it.
    Backup,
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Staged => "staged",
            Self::Published => "published",
            Self::Backup => "backup",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in DocVault operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another live transaction holds the document lock.
    ///
    /// Nothing was written; the caller may retry.
    #[error("document {path} is locked by {holder} (held for {age_ms} ms)")]
    Locked {
        /// The contended document path.
        path: String,
        /// The transaction currently holding the lock.
        holder: TransactionId,
        /// How long the lock has been held.
        age_ms: u64,
    },

    /// Staging, publishing or reading failed at the filesystem level.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] StorageError),

    /// Two digests of the same document disagreed.
    #[error("checksum mismatch on {stage} bytes: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Where the mismatch was detected.
        stage: VerifyStage,
        /// The digest of the content as supplied.
        expected: Checksum,
        /// The digest of the bytes actually found.
        actual: Checksum,
    },

    /// The published document was empty after writing.
    #[error("document {path} is empty after write")]
    EmptyAfterWrite {
        /// The document path.
        path: String,
    },

    /// The published document could not be read back.
    #[error("document {path} is not readable after write: {source}")]
    NotReadable {
        /// The document path.
        path: String,
        /// The read failure.
        #[source]
        source: StorageError,
    },

    /// A restore was requested for a document that has no backups.
    #[error("no backups exist for {path}")]
    NoBackups {
        /// The document path.
        path: String,
    },

    /// The requested backup is not known for this document.
    #[error("backup {backup_id} not found for {path}")]
    BackupNotFound {
        /// The document path.
        path: String,
        /// The requested backup (transaction) id.
        backup_id: TransactionId,
    },

    /// A backup is indexed but its bytes are gone from disk.
    #[error("backup bytes missing for {path} at {}", backup_path.display())]
    MissingBackupBytes {
        /// The document path.
        path: String,
        /// Where the backup bytes were expected.
        backup_path: PathBuf,
    },

    /// The document path is not a valid relative path inside the store.
    #[error("invalid document path {path:?}: {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A transaction was moved to a state it cannot reach.
    #[error("invalid transaction transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The current state.
        from: TransactionState,
        /// The requested state.
        to: TransactionState,
    },

    /// Another process has the store root open.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// The persisted transaction log could not be parsed.
    #[error("transaction log corrupted at line {line}: {message}")]
    LogCorruption {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// JSON encoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }

    /// Creates a transaction log corruption error.
    pub fn log_corruption(line: usize, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            line,
            message: message.into(),
        }
    }

    /// Returns true if this failure happened after the store may have
    /// touched the document, so the save must be rolled back.
    ///
    /// Lock conflicts and rejected paths fail before any mutation.
    #[must_use]
    pub fn triggers_rollback(&self) -> bool {
        !matches!(
            self,
            Self::Locked { .. } | Self::InvalidPath { .. } | Self::StoreLocked
        )
    }

    /// Returns true if this is a lock conflict.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}
