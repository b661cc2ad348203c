//! Store directory layout and process locking.
//!
//! Documents live directly under the store root. DocVault's own files sit
//! in a private directory next to them:
//!
//! ```text
//! <root>/
//! ├─ <documents...>
//! └─ .docvault/
//!    ├─ LOCK                 # Advisory lock for single-process access
//!    ├─ staging/             # {transaction_id}.tmp while a save runs
//!    ├─ backups/             # {basename}.{transaction_id}.backup
//!    └─ transactions.log     # JSON lines, when persistence is enabled
//! ```
//!
//! Staging shares the root's filesystem so that publishing is a plain
//! atomic rename.

use crate::types::META_DIR;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const STAGING_DIR: &str = "staging";
const BACKUPS_DIR: &str = "backups";
const LOG_FILE: &str = "transactions.log";

/// Paths of a store rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    /// Creates the layout for `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the private metadata directory.
    #[must_use]
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// Returns the staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.meta_dir().join(STAGING_DIR)
    }

    /// Returns the backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.meta_dir().join(BACKUPS_DIR)
    }

    /// Returns the persisted transaction log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.meta_dir().join(LOG_FILE)
    }

    /// Returns the advisory lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.meta_dir().join(LOCK_FILE)
    }
}

#[cfg(feature = "std")]
pub use process_lock::ProcessLock;

#[cfg(feature = "std")]
mod process_lock {
    use super::StoreLayout;
    use crate::error::{StoreError, StoreResult};
    use docvault_storage::StorageError;
    use fs2::FileExt;
    use std::fs::{File, OpenOptions};

    /// Exclusive advisory lock on a store root.
    ///
    /// Only one `ProcessLock` can exist per root at a time, across
    /// processes. The lock is released when the value is dropped and the
    /// file handle closes.
    #[derive(Debug)]
    pub struct ProcessLock {
        _file: File,
    }

    impl ProcessLock {
        /// Takes the lock for `layout`, creating the metadata directory.
        ///
        /// # Errors
        ///
        /// Returns `StoreLocked` if another handle holds the lock, or
        /// `IoFailure` if the lock file cannot be opened.
        pub fn acquire(layout: &StoreLayout) -> StoreResult<Self> {
            let meta = layout.meta_dir();
            std::fs::create_dir_all(&meta).map_err(|e| StorageError::io("create_dir", &meta, e))?;

            let lock_path = layout.lock_path();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|e| StorageError::io("open", &lock_path, e))?;

            // Non-blocking: a second writer fails fast instead of waiting
            if file.try_lock_exclusive().is_err() {
                return Err(StoreError::StoreLocked);
            }

            Ok(Self { _file: file })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_correct() {
        let layout = StoreLayout::new("/data/store");
        let meta = PathBuf::from("/data/store").join(".docvault");

        assert_eq!(layout.meta_dir(), meta);
        assert_eq!(layout.staging_dir(), meta.join("staging"));
        assert_eq!(layout.backup_dir(), meta.join("backups"));
        assert_eq!(layout.log_path(), meta.join("transactions.log"));
        assert_eq!(layout.lock_path(), meta.join("LOCK"));
    }

    #[cfg(feature = "std")]
    #[test]
    fn lock_prevents_second_open() {
        let temp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(temp.path().join("store"));

        let _first = ProcessLock::acquire(&layout).unwrap();
        let second = ProcessLock::acquire(&layout);
        assert!(matches!(second, Err(crate::StoreError::StoreLocked)));
    }

    #[cfg(feature = "std")]
    #[test]
    fn lock_released_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(temp.path().join("store"));

        {
            let _lock = ProcessLock::acquire(&layout).unwrap();
        }
        assert!(ProcessLock::acquire(&layout).is_ok());
    }
}
