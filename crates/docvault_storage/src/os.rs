//! Filesystem backed by the operating system.

use crate::error::{StorageError, StorageResult};
use crate::fs::DocumentFs;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The real filesystem, through `std::fs`.
///
/// # Durability
///
/// - `write_synced()` and `append_synced()` call `File::sync_all()` before
///   returning
/// - `sync_dir()` fsyncs the directory on Unix so that a rename is durable
///
/// # Example
///
/// ```no_run
/// use docvault_storage::{DocumentFs, OsFs};
/// use std::path::{Path, PathBuf};
///
/// let fs = OsFs::new();
/// fs.write_synced(Path::new("notes.tmp"), b"persistent data").unwrap();
/// fs.rename(Path::new("notes.tmp"), Path::new("notes.md")).unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl OsFs {
    /// Creates a handle to the OS filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DocumentFs for OsFs {
    fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
        fs::read(path).map_err(|e| StorageError::io("read", path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn write_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = File::create(path).map_err(|e| StorageError::io("create", path, e))?;
        file.write_all(data)
            .map_err(|e| StorageError::io("write", path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::io("fsync", path, e))?;
        Ok(())
    }

    fn append_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StorageError::io("open", path, e))?;
        file.write_all(data)
            .map_err(|e| StorageError::io("append", path, e))?;
        file.sync_all()
            .map_err(|e| StorageError::io("fsync", path, e))?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        fs::rename(from, to).map_err(|e| StorageError::io("rename", from, e))
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        fs::remove_file(path).map_err(|e| StorageError::io("remove", path, e))
    }

    fn create_dir_all(&self, path: &Path) -> StorageResult<()> {
        fs::create_dir_all(path).map_err(|e| StorageError::io("create_dir", path, e))
    }

    fn list_files(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io("read_dir", dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::io("read_dir", dir, e))?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// On Windows, directory fsync is not supported the way it is on Unix.
    /// NTFS journals metadata operations, so the explicit fsync is skipped.
    #[cfg(unix)]
    fn sync_dir(&self, path: &Path) -> StorageResult<()> {
        let dir = File::open(path).map_err(|e| StorageError::io("open_dir", path, e))?;
        dir.sync_all()
            .map_err(|e| StorageError::io("fsync_dir", path, e))?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self, _path: &Path) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");

        let fs = OsFs::new();
        fs.write_synced(&path, b"hello").unwrap();

        assert!(fs.exists(&path));
        assert_eq!(fs.read(&path).unwrap(), b"hello");
    }

    #[test]
    fn write_truncates_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");

        let fs = OsFs::new();
        fs.write_synced(&path, b"a longer first version").unwrap();
        fs.write_synced(&path, b"short").unwrap();

        assert_eq!(fs.read(&path).unwrap(), b"short");
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let result = OsFs::new().read(&dir.path().join("missing"));
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn append_creates_and_extends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");

        let fs = OsFs::new();
        fs.append_synced(&path, b"one\n").unwrap();
        fs.append_synced(&path, b"two\n").unwrap();

        assert_eq!(fs.read(&path).unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn rename_replaces_destination() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("a.tmp");
        let target = dir.path().join("a.md");

        let fs = OsFs::new();
        fs.write_synced(&target, b"old").unwrap();
        fs.write_synced(&staged, b"new").unwrap();
        fs.rename(&staged, &target).unwrap();

        assert!(!fs.exists(&staged));
        assert_eq!(fs.read(&target).unwrap(), b"new");
    }

    #[test]
    fn rename_missing_source_fails() {
        let dir = tempdir().unwrap();
        let fs = OsFs::new();
        let result = fs.rename(&dir.path().join("nope"), &dir.path().join("dest"));
        assert!(result.is_err());
        assert!(!fs.exists(&dir.path().join("dest")));
    }

    #[test]
    fn create_nested_dirs_and_sync() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("path");

        let fs = OsFs::new();
        fs.create_dir_all(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(fs.sync_dir(&nested).is_ok());
    }

    #[test]
    fn exists_is_false_for_directories() {
        let dir = tempdir().unwrap();
        assert!(!OsFs::new().exists(dir.path()));
    }

    #[test]
    fn copy_synced_duplicates_bytes() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");

        let fs = OsFs::new();
        fs.write_synced(&from, b"payload").unwrap();
        let copied = fs.copy_synced(&from, &to).unwrap();

        assert_eq!(copied, 7);
        assert_eq!(fs.read(&to).unwrap(), b"payload");
    }

    #[test]
    fn list_files_skips_dirs() {
        let dir = tempdir().unwrap();
        let fs = OsFs::new();
        fs.write_synced(&dir.path().join("b.tmp"), b"").unwrap();
        fs.write_synced(&dir.path().join("a.tmp"), b"").unwrap();
        fs.create_dir_all(&dir.path().join("sub")).unwrap();

        let files = fs.list_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.tmp"), dir.path().join("b.tmp")]);
        assert!(fs.list_files(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn remove_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let result = OsFs::new().remove(&dir.path().join("gone"));
        assert!(result.unwrap_err().is_not_found());
    }
}
