//! Test fixtures and store helpers.
//!
//! Every fixture uses a [`ManualClock`] and [`SequentialIds`], so tests
//! can move time forward and predict transaction ids (`txn_1`, `txn_2`,
//! ...).

use crate::fault::FaultyFs;
use docvault_core::{Clock, Config, DocumentManager, ManualClock, SequentialIds};
use docvault_storage::{DocumentFs, InMemoryFs, OsFs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Clock reading every fixture starts at (2023-11-14T22:13:20Z).
pub const FIXTURE_EPOCH_MS: u64 = 1_700_000_000_000;

const MEMORY_ROOT: &str = "/store";

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: DocumentManager,
    /// The clock driving the store.
    pub clock: Arc<ManualClock>,
    fs: Arc<dyn DocumentFs>,
    faults: Option<Arc<FaultyFs>>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates an in-memory test store with custom configuration.
    pub fn memory_with(config: Config) -> Self {
        Self::on_fs(Arc::new(InMemoryFs::new()), None, config)
    }

    /// Creates an in-memory test store whose filesystem can be faulted
    /// through [`TestStore::faults`].
    pub fn faulty() -> Self {
        Self::faulty_with(Config::default())
    }

    /// Creates a fault-injectable store with custom configuration.
    pub fn faulty_with(config: Config) -> Self {
        let faults = Arc::new(FaultyFs::new(Arc::new(InMemoryFs::new())));
        Self::on_fs(Arc::clone(&faults) as Arc<dyn DocumentFs>, Some(faults), config)
    }

    /// Creates a store on the real filesystem in a temporary directory.
    pub fn disk() -> Self {
        Self::disk_with(Config::default())
    }

    /// Creates an on-disk store with custom configuration.
    pub fn disk_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = Arc::new(ManualClock::new(FIXTURE_EPOCH_MS));
        let store = DocumentManager::builder(temp_dir.path().join("store"))
            .config(config)
            .clock(Arc::clone(&clock) as Arc<dyn Clock>)
            .id_generator(Arc::new(SequentialIds::new()))
            .open()
            .expect("Failed to open disk store");

        Self {
            store,
            clock,
            fs: Arc::new(OsFs::new()),
            faults: None,
            _temp_dir: Some(temp_dir),
        }
    }

    fn on_fs(fs: Arc<dyn DocumentFs>, faults: Option<Arc<FaultyFs>>, config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(FIXTURE_EPOCH_MS));
        let store = DocumentManager::builder(MEMORY_ROOT)
            .config(config)
            .filesystem(Arc::clone(&fs))
            .clock(Arc::clone(&clock) as Arc<dyn Clock>)
            .id_generator(Arc::new(SequentialIds::new()))
            .open()
            .expect("Failed to open in-memory store");

        Self {
            store,
            clock,
            fs,
            faults,
            _temp_dir: None,
        }
    }

    /// Returns the fault injector.
    ///
    /// # Panics
    ///
    /// Panics if the store was not created with [`TestStore::faulty`].
    pub fn faults(&self) -> &FaultyFs {
        self.faults
            .as_deref()
            .expect("store was not created with TestStore::faulty")
    }

    /// Returns the filesystem the store writes to.
    pub fn fs(&self) -> &dyn DocumentFs {
        self.fs.as_ref()
    }

    /// Resolves a document path to its location on the filesystem.
    pub fn doc_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .fold(self.store.root().to_path_buf(), |acc, s| acc.join(s))
    }

    /// Returns the files currently in the staging directory.
    pub fn staging_files(&self) -> Vec<PathBuf> {
        self.fs
            .list_files(&self.store.layout().staging_dir())
            .expect("Failed to list staging directory")
    }

    /// Returns the files currently in the backup directory.
    pub fn backup_files(&self) -> Vec<PathBuf> {
        self.fs
            .list_files(&self.store.layout().backup_dir())
            .expect("Failed to list backup directory")
    }

    /// Writes a document directly, bypassing the store.
    pub fn write_raw(&self, path: &str, content: &[u8]) {
        let target = self.doc_path(path);
        if let Some(parent) = target.parent() {
            self.fs.create_dir_all(parent).expect("Failed to create dir");
        }
        self.fs
            .write_synced(&target, content)
            .expect("Failed to write document");
    }

    /// Returns the temporary directory of an on-disk store.
    pub fn temp_path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestStore {
    type Target = DocumentManager;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use docvault_testkit::with_temp_store;
///
/// #[test]
/// fn my_test() {
///     with_temp_store(|store| {
///         store.save("doc.md", b"hello".to_vec(), Metadata::new()).unwrap();
///     });
/// }
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&DocumentManager) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary on-disk store.
pub fn with_disk_store<F, R>(f: F) -> R
where
    F: FnOnce(&DocumentManager) -> R,
{
    let test_store = TestStore::disk();
    f(&test_store.store)
}
