//! # DocVault Core
//!
//! Transactional document store for DocVault.
//!
//! This crate provides:
//! - Per-document locking with abandoned-lock takeover
//! - Backup snapshots taken before every overwrite
//! - Atomic stage-then-rename publishing with checksum verification
//! - Automatic rollback of failed saves
//! - A bounded transaction log and a lifecycle event feed
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use docvault_core::{DocumentManager, Metadata};
//! use std::path::Path;
//!
//! let store = DocumentManager::open(Path::new("artifacts"))?;
//! store.save("notes/today.md", b"# Today".to_vec(), Metadata::new())?;
//!
//! let history = store.history("notes/today.md")?;
//! println!("{} backups", history.backups.len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod checksum;
mod clock;
mod config;
mod dir;
mod error;
mod events;
mod lock;
mod log;
mod manager;
mod stats;
mod transaction;
mod types;
mod writer;

pub use backup::{BackupInfo, BackupSelector, BackupSnapshot, BackupStore, BACKUP_EXT};
pub use checksum::{Checksum, CHECKSUM_SIZE};
pub use clock::{Clock, IdGenerator, ManualClock, RandomIds, SequentialIds, SystemClock, MILLIS_PER_DAY};
pub use config::Config;
#[cfg(feature = "std")]
pub use dir::ProcessLock;
pub use dir::StoreLayout;
pub use error::{StoreError, StoreResult, VerifyStage};
pub use events::{EventFeed, EventKind, StoreEvent};
pub use lock::{LockDescriptor, LockGuard, LockTable};
pub use log::{LogEntry, RollbackOutcome, TransactionLog, TransactionStatus};
pub use manager::{
    BatchItem, BatchResult, DocumentInput, DocumentManager, HistoryView, RestoreInfo,
    SaveOutcome, StoreBuilder,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use transaction::{Transaction, TransactionState, TransactionSummary};
pub use types::{DocPath, MetaValue, Metadata, TransactionId, META_DIR};
pub use writer::{AtomicWriter, STAGING_EXT};

// Re-exported so callers can inject filesystems without a direct dependency
pub use docvault_storage::{DocumentFs, InMemoryFs, OsFs, StorageError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
