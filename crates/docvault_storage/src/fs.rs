//! Filesystem trait definition.

use crate::error::StorageResult;
use std::path::{Path, PathBuf};

/// A filesystem that DocVault persists documents into.
///
/// Implementations are **opaque byte stores keyed by path**. DocVault owns
/// the on-disk layout, staging and verification; a filesystem only moves
/// bytes around.
///
/// # Invariants
///
/// - `write_synced` returns only after the data is durable (fsync, not a
///   buffered write)
/// - `rename` replaces the destination atomically: a concurrent `read` of
///   the destination sees the old bytes or the new bytes, never a mix
/// - `read` returns exactly the bytes last written or renamed into place
/// - Implementations must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::OsFs`] - The real filesystem
/// - [`super::InMemoryFs`] - For testing
pub trait DocumentFs: Send + Sync {
    /// Reads the full contents of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if the file does not exist,
    /// or an I/O error.
    fn read(&self, path: &Path) -> StorageResult<Vec<u8>>;

    /// Returns true if a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Creates or truncates the file at `path`, writes `data` and syncs it
    /// to durable storage before returning.
    ///
    /// The parent directory must already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the sync fails.
    fn write_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Appends `data` to the file at `path`, creating it if missing, and
    /// syncs it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the sync fails.
    fn append_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Atomically moves `from` to `to`, replacing `to` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails. On error, `to` is unchanged.
    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if the file does not exist.
    fn remove(&self, path: &Path) -> StorageResult<()>;

    /// Creates `path` and all missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> StorageResult<()>;

    /// Lists the files directly inside `dir`, sorted.
    ///
    /// A missing directory lists as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    fn list_files(&self, dir: &Path) -> StorageResult<Vec<PathBuf>>;

    /// Syncs directory metadata so that renames, creations and deletions
    /// inside `path` survive a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be synced.
    fn sync_dir(&self, path: &Path) -> StorageResult<()>;

    /// Copies `from` to `to` with a synced write, returning the byte count.
    ///
    /// # Errors
    ///
    /// Returns an error if reading `from` or writing `to` fails.
    fn copy_synced(&self, from: &Path, to: &Path) -> StorageResult<u64> {
        let data = self.read(from)?;
        self.write_synced(to, &data)?;
        Ok(data.len() as u64)
    }
}
