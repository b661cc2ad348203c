//! Document manager facade.

use crate::backup::{BackupInfo, BackupSelector, BackupSnapshot, BackupStore};
use crate::checksum::Checksum;
use crate::clock::{Clock, IdGenerator, RandomIds, SystemClock, MILLIS_PER_DAY};
use crate::config::Config;
use crate::dir::StoreLayout;
use crate::error::{StoreError, StoreResult, VerifyStage};
use crate::events::{EventFeed, EventKind, StoreEvent};
use crate::lock::LockTable;
use crate::log::{LogEntry, RollbackOutcome, TransactionLog, TransactionStatus};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::transaction::{Transaction, TransactionState};
use crate::types::{DocPath, Metadata, TransactionId};
use crate::writer::{AtomicWriter, STAGING_EXT};
use docvault_storage::{DocumentFs, InMemoryFs, OsFs, StorageError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The result of a committed save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// The committed transaction.
    pub transaction_id: TransactionId,
    /// The document path.
    pub path: DocPath,
    /// Content size in bytes.
    pub size: u64,
    /// Content checksum.
    pub checksum: Checksum,
    /// How long the save took.
    pub duration_ms: u64,
    /// The snapshot taken of the previous content, if any.
    pub backup: Option<BackupSnapshot>,
}

/// One document handed to [`DocumentManager::batch_save`].
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInput {
    /// The document path.
    pub path: String,
    /// New content.
    pub content: Vec<u8>,
    /// Caller metadata.
    pub metadata: Metadata,
}

impl DocumentInput {
    /// Creates an input without metadata.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome of one document in a batch.
#[derive(Debug)]
pub struct BatchItem {
    /// The path as supplied.
    pub path: String,
    /// The save result.
    pub result: StoreResult<SaveOutcome>,
}

impl BatchItem {
    /// Returns true if the document was committed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate result of a batch save.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Number of committed documents.
    pub succeeded: usize,
    /// Number of failed documents.
    pub failed: usize,
    /// Per-document outcomes, in input order.
    pub items: Vec<BatchItem>,
}

/// The result of an explicit restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreInfo {
    /// Id of the restore operation itself.
    pub operation_id: TransactionId,
    /// The document path.
    pub path: DocPath,
    /// The restored backup (the transaction that took it).
    pub backup_id: TransactionId,
    /// Where the backup bytes were read from.
    pub backup_path: PathBuf,
    /// Checksum of the restored bytes.
    pub checksum: Checksum,
    /// Size of the restored bytes.
    pub size: u64,
    /// Snapshot of the content the restore replaced, if it could be taken.
    /// Restoring it undoes the restore.
    pub previous: Option<BackupSnapshot>,
}

/// Backups and log entries of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryView {
    /// The document path.
    pub path: DocPath,
    /// Retained backups, oldest first.
    pub backups: Vec<BackupInfo>,
    /// Transaction log entries, oldest first.
    pub transactions: Vec<LogEntry>,
}

/// Builder for a [`DocumentManager`] with injected collaborators.
///
/// ```rust,ignore
/// let store = DocumentManager::builder("/srv/artifacts")
///     .config(Config::default().max_backups(10))
///     .clock(Arc::new(ManualClock::new(0)))
///     .open()?;
/// ```
pub struct StoreBuilder {
    root: PathBuf,
    config: Config,
    fs: Option<Arc<dyn DocumentFs>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl StoreBuilder {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            config: Config::default(),
            fs: None,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIds),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Uses `fs` instead of the operating system filesystem.
    ///
    /// Stores on a custom filesystem never take the process lock.
    #[must_use]
    pub fn filesystem(mut self, fs: Arc<dyn DocumentFs>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Sets the clock used for timestamps and lock expiry.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the transaction id generator.
    #[must_use]
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Opens the store.
    ///
    /// # Errors
    ///
    /// - `StoreLocked` if another process holds the root
    /// - `IoFailure` if the root is missing and may not be created, or the
    ///   metadata directories cannot be created
    /// - `LogCorruption` if a persisted transaction log cannot be parsed
    pub fn open(self) -> StoreResult<DocumentManager> {
        let layout = StoreLayout::new(self.root);
        let config = self.config;

        let (fs, process_lock) = match self.fs {
            Some(fs) => (fs, None),
            None => {
                if !config.create_if_missing && !layout.root().is_dir() {
                    return Err(StorageError::NotFound {
                        path: layout.root().to_path_buf(),
                    }
                    .into());
                }
                let fs: Arc<dyn DocumentFs> = Arc::new(OsFs::new());
                fs.create_dir_all(layout.root())?;
                (fs, take_process_lock(&layout, &config)?)
            }
        };

        fs.create_dir_all(&layout.staging_dir())?;
        fs.create_dir_all(&layout.backup_dir())?;

        let stats = Arc::new(StoreStats::new());
        let writer = AtomicWriter::new(
            Arc::clone(&fs),
            layout.staging_dir(),
            config.sync_directories,
        );
        sweep_staging(&writer, fs.as_ref());

        let backups = BackupStore::new(
            Arc::clone(&fs),
            layout.backup_dir(),
            writer.clone(),
            config.max_backups,
            Arc::clone(&self.clock),
        );
        let log = if config.persist_log {
            TransactionLog::open(Arc::clone(&fs), layout.log_path(), config.max_log_entries)?
        } else {
            TransactionLog::in_memory(Arc::clone(&fs), config.max_log_entries)
        };
        let locks = LockTable::new(
            config.lock_timeout,
            Arc::clone(&self.clock),
            Arc::clone(&stats),
        );
        let events = EventFeed::with_max_history(config.max_event_history);

        info!(root = %layout.root().display(), log_entries = log.len(), "opened document store");

        Ok(DocumentManager {
            config,
            layout,
            fs,
            locks,
            backups,
            writer,
            log,
            stats,
            events,
            clock: self.clock,
            ids: self.ids,
            _process_lock: process_lock,
        })
    }
}

#[cfg(feature = "std")]
type ProcessLockSlot = Option<crate::dir::ProcessLock>;
#[cfg(not(feature = "std"))]
type ProcessLockSlot = Option<()>;

#[cfg(feature = "std")]
fn take_process_lock(layout: &StoreLayout, config: &Config) -> StoreResult<ProcessLockSlot> {
    if config.exclusive {
        crate::dir::ProcessLock::acquire(layout).map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(not(feature = "std"))]
fn take_process_lock(_layout: &StoreLayout, _config: &Config) -> StoreResult<ProcessLockSlot> {
    Ok(None)
}

/// Removes staging files left behind by a crash mid-save.
fn sweep_staging(writer: &AtomicWriter, fs: &dyn DocumentFs) {
    let leftovers = match fs.list_files(writer.staging_dir()) {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "could not list staging directory");
            return;
        }
    };

    for staging in leftovers
        .iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == STAGING_EXT))
    {
        warn!(staging = %staging.display(), "removing abandoned staging file");
        writer.discard(staging);
    }
}

/// The document store.
///
/// `DocumentManager` is the entry point of DocVault. Every save runs as a
/// transaction:
/// - The document path is locked for the duration of the save
/// - The previous content is backed up
/// - New content is staged, checksummed and atomically published
/// - The published bytes are read back and verified
/// - Any failure rolls the document back to its previous content
///
/// The manager is `Send + Sync`; share it across threads with an `Arc`.
/// Saves of different paths run independently. Two saves of the same path
/// never interleave: the second fails fast with `Locked`.
///
/// # Opening a store
///
/// ```rust,ignore
/// use docvault_core::{DocumentManager, Metadata};
/// use std::path::Path;
///
/// let store = DocumentManager::open(Path::new("artifacts"))?;
/// let outcome = store.save("reports/q3.md", b"# Q3".to_vec(), Metadata::new())?;
/// println!("committed {}", outcome.transaction_id);
/// ```
///
/// # In-memory stores
///
/// For tests, `DocumentManager::open_in_memory()` keeps everything in an
/// [`InMemoryFs`].
pub struct DocumentManager {
    config: Config,
    layout: StoreLayout,
    fs: Arc<dyn DocumentFs>,
    locks: LockTable,
    backups: BackupStore,
    writer: AtomicWriter,
    log: TransactionLog,
    stats: Arc<StoreStats>,
    events: EventFeed,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    /// Held for the lifetime of the store; None for custom filesystems.
    _process_lock: ProcessLockSlot,
}

impl DocumentManager {
    /// Opens a store rooted at `root` on the local filesystem.
    ///
    /// Creates the root if it doesn't exist and takes the advisory process
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another process has the root open, or
    /// `IoFailure` on filesystem errors.
    pub fn open(root: &Path) -> StoreResult<Self> {
        Self::open_with_config(root, Config::default())
    }

    /// Opens a store rooted at `root` with custom configuration.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use docvault_core::{Config, DocumentManager};
    /// use std::{path::Path, time::Duration};
    ///
    /// let config = Config::default()
    ///     .lock_timeout(Duration::from_secs(5))
    ///     .persist_log(true);
    ///
    /// let store = DocumentManager::open_with_config(Path::new("artifacts"), config)?;
    /// ```
    ///
    /// # Errors
    ///
    /// See [`StoreBuilder::open`].
    pub fn open_with_config(root: &Path, config: Config) -> StoreResult<Self> {
        Self::builder(root).config(config).open()
    }

    /// Opens a fresh in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Only fails if the in-memory filesystem does, which it doesn't.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::builder("/docvault")
            .filesystem(Arc::new(InMemoryFs::new()))
            .open()
    }

    /// Starts building a store rooted at `root`.
    pub fn builder(root: impl Into<PathBuf>) -> StoreBuilder {
        StoreBuilder::new(root.into())
    }

    /// Saves `content` at `path` as one transaction.
    ///
    /// On success the document holds exactly `content`. On failure it
    /// holds what it held before the call, unless the rollback itself
    /// failed (reported through a `RollbackFailed` event).
    ///
    /// # Errors
    ///
    /// - `InvalidPath` if `path` is not a valid document path
    /// - `Locked` if another transaction holds the document; nothing was
    ///   written and no rollback ran
    /// - `IoFailure`, `ChecksumMismatch`, `EmptyAfterWrite` or
    ///   `NotReadable` if writing or verification failed; the document was
    ///   rolled back
    pub fn save(
        &self,
        path: &str,
        content: impl Into<Vec<u8>>,
        metadata: Metadata,
    ) -> StoreResult<SaveOutcome> {
        let path = DocPath::parse(path)?;
        let start = self.clock.now_millis();
        let id = self.ids.next_id(start);

        // Released on every exit, panics included
        let _guard = self.locks.acquire(&path, &id)?;

        let mut txn = Transaction::new(id, path, content.into(), metadata, start);
        let target = txn.path().resolve(self.layout.root());
        let existed = self.fs.exists(&target);
        debug!(txn = %txn.id(), path = %txn.path(), bytes = txn.content().len(), existed, "save started");

        match self.backups.snapshot(txn.path(), &target, txn.id()) {
            Ok(backup) => txn.attach_backup(backup),
            Err(e) => warn!(
                txn = %txn.id(),
                path = %txn.path(),
                error = %e,
                "backup failed, continuing without one"
            ),
        }

        let result = self
            .write_and_verify(&mut txn, &target)
            .and_then(|()| txn.advance(TransactionState::Committed, self.clock.now_millis()));

        match result {
            Ok(()) => Ok(self.commit(txn)),
            Err(e) => {
                self.roll_back(&mut txn, &target, existed, &e);
                Err(e)
            }
        }
    }

    /// Saves each document in order as an independent transaction.
    ///
    /// A failing document does not stop the batch and does not undo the
    /// documents committed before it.
    pub fn batch_save<I>(&self, documents: I) -> BatchResult
    where
        I: IntoIterator<Item = DocumentInput>,
    {
        let mut batch = BatchResult::default();

        for doc in documents {
            let result = self.save(&doc.path, doc.content, doc.metadata);
            if result.is_ok() {
                batch.succeeded += 1;
            } else {
                batch.failed += 1;
            }
            batch.items.push(BatchItem {
                path: doc.path,
                result,
            });
        }

        debug!(succeeded = batch.succeeded, failed = batch.failed, "batch finished");
        batch
    }

    /// Reverts `path` to one of its backups, the latest if `backup_id` is
    /// `None`.
    ///
    /// The restore holds the document lock, so it never interleaves with a
    /// save of the same path. The content it replaces is snapshotted first
    /// under the restore's operation id, so a restore can itself be undone.
    ///
    /// # Errors
    ///
    /// - `Locked` if a save of the document is in progress
    /// - `NoBackups`, `BackupNotFound` or `MissingBackupBytes` if there is
    ///   nothing to restore
    /// - `ChecksumMismatch` if the backup bytes were altered
    /// - `IoFailure` if writing the document fails
    pub fn restore_from_backup(
        &self,
        path: &str,
        backup_id: Option<TransactionId>,
    ) -> StoreResult<RestoreInfo> {
        let path = DocPath::parse(path)?;
        let operation_id = self.ids.next_id(self.clock.now_millis());
        let _guard = self.locks.acquire(&path, &operation_id)?;

        let target = path.resolve(self.layout.root());
        let selected = self
            .backups
            .find(&path, &BackupSelector::from(backup_id))?;

        // The replaced content becomes a backup of its own
        let previous = match self.backups.snapshot(&path, &target, &operation_id) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(
                    op = %operation_id,
                    %path,
                    error = %e,
                    "could not back up content replaced by restore"
                );
                None
            }
        };

        let restored = self.backups.restore(
            &path,
            &target,
            &BackupSelector::Id(selected.transaction_id),
            &operation_id,
        );
        self.backups.prune(&path);
        let snapshot = restored?;

        self.stats.record_restore();
        self.emit(EventKind::BackupRestored {
            transaction_id: operation_id.clone(),
            path: path.clone(),
            backup_id: snapshot.transaction_id.clone(),
        });

        Ok(RestoreInfo {
            operation_id,
            path,
            backup_id: snapshot.transaction_id,
            backup_path: snapshot.backup_path,
            checksum: snapshot.checksum,
            size: snapshot.size,
            previous,
        })
    }

    /// Returns the retained backups and log entries of `path`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if `path` is not a valid document path.
    pub fn history(&self, path: &str) -> StoreResult<HistoryView> {
        let path = DocPath::parse(path)?;
        Ok(HistoryView {
            backups: self.backups.list(&path),
            transactions: self.log.entries_for(&path),
            path,
        })
    }

    /// Reads the current content of a document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` for a bad path, or `IoFailure` if the document
    /// doesn't exist or cannot be read.
    pub fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
        let path = DocPath::parse(path)?;
        Ok(self.fs.read(&path.resolve(self.layout.root()))?)
    }

    /// Returns a snapshot of the store counters.
    pub fn statistics(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Removes transaction log entries older than `days_to_keep` days.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a persisted log cannot be rewritten.
    pub fn prune_log(&self, days_to_keep: u64) -> StoreResult<usize> {
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(days_to_keep.saturating_mul(MILLIS_PER_DAY));
        let removed = self.log.prune_before(cutoff)?;
        if removed > 0 {
            info!(removed, days_to_keep, "pruned transaction log");
        }
        Ok(removed)
    }

    /// Prunes the transaction log with the configured retention.
    ///
    /// # Errors
    ///
    /// Returns an error if a persisted log cannot be rewritten.
    pub fn prune_log_default(&self) -> StoreResult<usize> {
        self.prune_log(self.config.log_retention_days)
    }

    /// Subscribes to store events.
    ///
    /// Returns a receiver for all future events. Drop it to unsubscribe.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Returns past events with sequence > `cursor`, up to `limit`.
    pub fn recent_events(&self, cursor: u64, limit: usize) -> Vec<StoreEvent> {
        self.events.poll(cursor, limit)
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Returns the directory layout.
    #[must_use]
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stages, publishes and verifies the transaction's content.
    fn write_and_verify(&self, txn: &mut Transaction, target: &Path) -> StoreResult<()> {
        let staging = self.writer.stage(txn.id(), txn.content())?;

        let staged = match self.writer.read_staged(&staging) {
            Ok(bytes) => Checksum::of(&bytes),
            Err(e) => {
                self.writer.discard(&staging);
                return Err(e);
            }
        };
        if staged != txn.checksum() {
            self.writer.discard(&staging);
            return Err(StoreError::ChecksumMismatch {
                stage: VerifyStage::Staged,
                expected: txn.checksum(),
                actual: staged,
            });
        }

        self.writer.publish(&staging, target)?;
        txn.advance(TransactionState::Written, self.clock.now_millis())?;

        self.verify_published(txn, target)?;
        txn.advance(TransactionState::Verified, self.clock.now_millis())?;
        debug!(txn = %txn.id(), "published bytes verified");
        Ok(())
    }

    fn verify_published(&self, txn: &Transaction, target: &Path) -> StoreResult<()> {
        let not_readable = |source| StoreError::NotReadable {
            path: txn.path().to_string(),
            source,
        };

        if !self.fs.exists(target) {
            return Err(not_readable(StorageError::NotFound {
                path: target.to_path_buf(),
            }));
        }
        let bytes = self.fs.read(target).map_err(not_readable)?;

        let actual = Checksum::of(&bytes);
        if actual != txn.checksum() {
            return Err(StoreError::ChecksumMismatch {
                stage: VerifyStage::Published,
                expected: txn.checksum(),
                actual,
            });
        }
        if bytes.is_empty() {
            return Err(StoreError::EmptyAfterWrite {
                path: txn.path().to_string(),
            });
        }
        Ok(())
    }

    fn commit(&self, txn: Transaction) -> SaveOutcome {
        let now = self.clock.now_millis();
        let duration_ms = txn.duration_ms(now);
        let size = txn.content().len() as u64;

        self.append_log(LogEntry {
            id: txn.id().clone(),
            path: txn.path().clone(),
            timestamp: txn.start_time(),
            duration_ms,
            status: TransactionStatus::Committed,
            size,
            error: None,
            rollback: None,
        });
        self.backups.prune(txn.path());
        self.stats.record_save(size);

        self.emit(EventKind::TransactionCommitted {
            transaction: txn.summary(),
        });
        self.emit(EventKind::DocumentSaved {
            transaction_id: txn.id().clone(),
            path: txn.path().clone(),
            size,
            duration_ms,
        });
        info!(txn = %txn.id(), path = %txn.path(), size, duration_ms, "document saved");

        SaveOutcome {
            transaction_id: txn.id().clone(),
            path: txn.path().clone(),
            size,
            checksum: txn.checksum(),
            duration_ms,
            backup: txn.backup().cloned(),
        }
    }

    /// Puts the document back the way it was before `txn` and records the
    /// failure.
    fn roll_back(&self, txn: &mut Transaction, target: &Path, existed: bool, cause: &StoreError) {
        let published = txn.state() != TransactionState::Pending;
        if let Err(e) = txn.advance(TransactionState::Failed, self.clock.now_millis()) {
            warn!(txn = %txn.id(), error = %e, "transaction already finished");
        }
        self.writer.discard(&self.writer.staging_path(txn.id()));

        let rollback = match txn.backup() {
            Some(snapshot) => {
                let selector = BackupSelector::Id(snapshot.transaction_id.clone());
                self.backups
                    .restore(txn.path(), target, &selector, txn.id())
                    .map(|_| RollbackOutcome::Restored)
            }
            // The save created the document; remove it again
            None if !existed && self.fs.exists(target) => self
                .fs
                .remove(target)
                .map(|()| RollbackOutcome::Removed)
                .map_err(StoreError::from),
            None if existed && published => Err(StoreError::NoBackups {
                path: txn.path().to_string(),
            }),
            None => Ok(RollbackOutcome::NothingToRestore),
        };

        let now = self.clock.now_millis();
        let outcome = match rollback {
            Ok(outcome) => {
                self.emit(EventKind::DocumentRollback {
                    transaction_id: txn.id().clone(),
                    path: txn.path().clone(),
                    backup_path: txn.backup().map(|b| b.backup_path.clone()),
                    reason: cause.to_string(),
                });
                warn!(txn = %txn.id(), path = %txn.path(), error = %cause, ?outcome, "save rolled back");
                outcome
            }
            Err(e) => {
                self.stats.record_rollback_failure();
                self.emit(EventKind::RollbackFailed {
                    transaction_id: txn.id().clone(),
                    path: txn.path().clone(),
                    error: e.to_string(),
                });
                error!(
                    txn = %txn.id(),
                    path = %txn.path(),
                    cause = %cause,
                    error = %e,
                    "rollback failed, document may hold unexpected content"
                );
                RollbackOutcome::Failed
            }
        };

        self.append_log(LogEntry {
            id: txn.id().clone(),
            path: txn.path().clone(),
            timestamp: txn.start_time(),
            duration_ms: txn.duration_ms(now),
            status: TransactionStatus::Failed,
            size: txn.content().len() as u64,
            error: Some(cause.to_string()),
            rollback: Some(outcome),
        });
        self.stats.record_rollback();
        self.backups.prune(txn.path());
    }

    fn append_log(&self, entry: LogEntry) {
        let id = entry.id.clone();
        if let Err(e) = self.log.append(entry) {
            warn!(txn = %id, error = %e, "failed to persist transaction log entry");
        }
    }

    fn emit(&self, kind: EventKind) {
        self.events.emit(kind, self.clock.now_millis());
    }
}
