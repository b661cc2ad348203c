//! Atomic document writes.
//!
//! Content is written in two steps:
//! 1. `stage` writes `{transaction_id}.tmp` in the staging directory and
//!    fsyncs it
//! 2. `publish` renames the staging file over the final path and fsyncs the
//!    parent directory
//!
//! The staging directory sits under the store root, on the same filesystem
//! as the documents, so the rename is atomic: readers of the final path see
//! the old bytes or the new bytes, never a mix.
//!
//! The writer never restores previous content. Rolling back a published
//! document is the job of the backup store.

use crate::error::StoreResult;
use crate::types::TransactionId;
use docvault_storage::DocumentFs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Extension of staging files.
pub const STAGING_EXT: &str = "tmp";

/// Stages and publishes document bytes.
#[derive(Clone)]
pub struct AtomicWriter {
    fs: Arc<dyn DocumentFs>,
    staging_dir: PathBuf,
    sync_directories: bool,
}

impl AtomicWriter {
    /// Creates a writer staging into `staging_dir`.
    ///
    /// The directory is created on first use.
    pub fn new(fs: Arc<dyn DocumentFs>, staging_dir: PathBuf, sync_directories: bool) -> Self {
        Self {
            fs,
            staging_dir,
            sync_directories,
        }
    }

    /// Returns the staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Returns the staging path used by `transaction_id`.
    #[must_use]
    pub fn staging_path(&self, transaction_id: &TransactionId) -> PathBuf {
        self.staging_dir
            .join(format!("{}.{STAGING_EXT}", transaction_id.as_str()))
    }

    /// Writes `content` to the transaction's staging file and syncs it.
    ///
    /// # Errors
    ///
    /// Returns `IoFailure` if the staging directory cannot be created or
    /// the write or fsync fails. A partially written staging file is
    /// removed before returning.
    pub fn stage(&self, transaction_id: &TransactionId, content: &[u8]) -> StoreResult<PathBuf> {
        self.fs.create_dir_all(&self.staging_dir)?;
        let staging = self.staging_path(transaction_id);

        if let Err(e) = self.fs.write_synced(&staging, content) {
            self.discard(&staging);
            return Err(e.into());
        }

        debug!(staging = %staging.display(), bytes = content.len(), "staged content");
        Ok(staging)
    }

    /// Reads back the bytes of a staged file.
    ///
    /// # Errors
    ///
    /// Returns `IoFailure` if the file cannot be read.
    pub fn read_staged(&self, staging: &Path) -> StoreResult<Vec<u8>> {
        Ok(self.fs.read(staging)?)
    }

    /// Atomically moves a staged file to `target`.
    ///
    /// Creates the parent directory of `target` if needed.
    ///
    /// # Errors
    ///
    /// Returns `IoFailure` if the directory cannot be created or the rename
    /// fails. The staging file is removed in that case and `target` keeps
    /// whatever it held before.
    pub fn publish(&self, staging: &Path, target: &Path) -> StoreResult<()> {
        let parent = target.parent().filter(|p| !p.as_os_str().is_empty());

        let result = parent
            .map_or(Ok(()), |p| self.fs.create_dir_all(p))
            .and_then(|()| self.fs.rename(staging, target));
        if let Err(e) = result {
            self.discard(staging);
            return Err(e.into());
        }

        if self.sync_directories {
            if let Some(parent) = parent {
                // The rename has happened; a failed directory sync only
                // weakens crash durability, it does not undo the publish.
                if let Err(e) = self.fs.sync_dir(parent) {
                    warn!(dir = %parent.display(), error = %e, "directory sync failed after publish");
                }
            }
        }

        debug!(target = %target.display(), "published document");
        Ok(())
    }

    /// Stages and publishes in one call.
    ///
    /// # Errors
    ///
    /// Returns `IoFailure` if either step fails.
    pub fn write_atomic(
        &self,
        transaction_id: &TransactionId,
        target: &Path,
        content: &[u8],
    ) -> StoreResult<()> {
        let staging = self.stage(transaction_id, content)?;
        self.publish(&staging, target)
    }

    /// Removes a staging file, ignoring a file that is already gone.
    pub fn discard(&self, staging: &Path) {
        match self.fs.remove(staging) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(staging = %staging.display(), error = %e, "failed to remove staging file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_storage::InMemoryFs;

    fn writer() -> (Arc<InMemoryFs>, AtomicWriter) {
        let fs = Arc::new(InMemoryFs::new());
        let writer = AtomicWriter::new(
            Arc::clone(&fs) as Arc<dyn DocumentFs>,
            PathBuf::from("/store/.docvault/staging"),
            true,
        );
        (fs, writer)
    }

    #[test]
    fn stage_names_file_after_transaction() {
        let (fs, writer) = writer();
        let staging = writer.stage(&"txn_1".into(), b"hello").unwrap();

        assert_eq!(staging, PathBuf::from("/store/.docvault/staging/txn_1.tmp"));
        assert_eq!(fs.read(&staging).unwrap(), b"hello");
        assert_eq!(writer.read_staged(&staging).unwrap(), b"hello");
    }

    #[test]
    fn publish_creates_parent_and_moves() {
        let (fs, writer) = writer();
        let staging = writer.stage(&"txn_1".into(), b"hello").unwrap();
        let target = Path::new("/store/deep/nested/doc.md");

        writer.publish(&staging, target).unwrap();

        assert!(!fs.exists(&staging));
        assert_eq!(fs.read(target).unwrap(), b"hello");
    }

    #[test]
    fn publish_replaces_existing_content() {
        let (fs, writer) = writer();
        fs.create_dir_all(Path::new("/store")).unwrap();
        fs.write_synced(Path::new("/store/doc.md"), b"old").unwrap();

        writer
            .write_atomic(&"txn_2".into(), Path::new("/store/doc.md"), b"new")
            .unwrap();

        assert_eq!(fs.read(Path::new("/store/doc.md")).unwrap(), b"new");
        assert!(fs.files_under(writer.staging_dir()).is_empty());
    }

    #[test]
    fn publish_of_missing_staging_leaves_target_alone() {
        let (fs, writer) = writer();
        fs.create_dir_all(Path::new("/store")).unwrap();
        fs.write_synced(Path::new("/store/doc.md"), b"old").unwrap();

        let missing = writer.staging_path(&"txn_missing".into());
        assert!(writer.publish(&missing, Path::new("/store/doc.md")).is_err());
        assert_eq!(fs.read(Path::new("/store/doc.md")).unwrap(), b"old");
    }

    #[test]
    fn discard_ignores_missing_file() {
        let (_, writer) = writer();
        writer.discard(Path::new("/store/.docvault/staging/none.tmp"));
    }
}
