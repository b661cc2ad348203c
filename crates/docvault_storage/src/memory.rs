//! In-memory filesystem for testing.

use crate::error::{StorageError, StorageResult};
use crate::fs::DocumentFs;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

/// An in-memory filesystem.
///
/// Files live in a map guarded by a single lock, so `rename` is trivially
/// atomic. Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// Writing into a directory that was never created fails, matching the
/// behaviour of a real filesystem closely enough to exercise the store's
/// directory handling.
///
/// # Example
///
/// ```rust
/// use docvault_storage::{DocumentFs, InMemoryFs};
/// use std::path::Path;
///
/// let fs = InMemoryFs::new();
/// fs.create_dir_all(Path::new("/docs")).unwrap();
/// fs.write_synced(Path::new("/docs/a.md"), b"test data").unwrap();
/// assert!(fs.exists(Path::new("/docs/a.md")));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryFs {
    state: RwLock<MemState>,
}

#[derive(Debug, Default)]
struct MemState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl MemState {
    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(p) if p.as_os_str().is_empty() || p.parent().is_none() => true,
            Some(p) => self.dirs.contains(p),
        }
    }
}

fn missing_parent(op: &'static str, path: &Path) -> StorageError {
    StorageError::Io {
        op,
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::NotFound, "parent directory does not exist"),
    }
}

impl InMemoryFs {
    /// Creates a new empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every file path currently stored, sorted.
    ///
    /// Useful for asserting that no staging files were left behind.
    #[must_use]
    pub fn files(&self) -> Vec<PathBuf> {
        self.state.read().files.keys().cloned().collect()
    }

    /// Returns the files stored directly or transitively under `dir`.
    #[must_use]
    pub fn files_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.state
            .read()
            .files
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect()
    }
}

impl DocumentFs for InMemoryFs {
    fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
        self.state
            .read()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn exists(&self, path: &Path) -> bool {
        self.state.read().files.contains_key(path)
    }

    fn write_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.parent_exists(path) {
            return Err(missing_parent("create", path));
        }
        state.files.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn append_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.parent_exists(path) {
            return Err(missing_parent("open", path));
        }
        state
            .files
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.parent_exists(to) {
            return Err(missing_parent("rename", to));
        }
        let data = state.files.remove(from).ok_or_else(|| StorageError::NotFound {
            path: from.to_path_buf(),
        })?;
        state.files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        self.state
            .write()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn create_dir_all(&self, path: &Path) -> StorageResult<()> {
        let mut state = self.state.write();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() || ancestor.parent().is_none() {
                continue;
            }
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        Ok(self
            .state
            .read()
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn sync_dir(&self, _path: &Path) -> StorageResult<()> {
        // Nothing to sync in memory
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> &Path {
        Path::new(s)
    }

    #[test]
    fn new_is_empty() {
        let fs = InMemoryFs::new();
        assert!(fs.files().is_empty());
    }

    #[test]
    fn write_requires_parent_dir() {
        let fs = InMemoryFs::new();
        assert!(fs.write_synced(p("/root/docs/a.md"), b"x").is_err());

        fs.create_dir_all(p("/root/docs")).unwrap();
        fs.write_synced(p("/root/docs/a.md"), b"x").unwrap();
        assert_eq!(fs.read(p("/root/docs/a.md")).unwrap(), b"x");
    }

    #[test]
    fn top_level_files_need_no_dir() {
        let fs = InMemoryFs::new();
        fs.write_synced(p("/a.md"), b"x").unwrap();
        fs.write_synced(p("b.md"), b"y").unwrap();
        assert_eq!(fs.files().len(), 2);
    }

    #[test]
    fn read_missing_fails() {
        let fs = InMemoryFs::new();
        assert!(fs.read(p("/nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn rename_moves_bytes() {
        let fs = InMemoryFs::new();
        fs.create_dir_all(p("/r/staging")).unwrap();
        fs.write_synced(p("/r/staging/1.tmp"), b"new").unwrap();
        fs.write_synced(p("/r/doc.md"), b"old").unwrap();

        fs.rename(p("/r/staging/1.tmp"), p("/r/doc.md")).unwrap();

        assert!(!fs.exists(p("/r/staging/1.tmp")));
        assert_eq!(fs.read(p("/r/doc.md")).unwrap(), b"new");
    }

    #[test]
    fn rename_into_missing_dir_fails_and_keeps_source() {
        let fs = InMemoryFs::new();
        fs.create_dir_all(p("/r")).unwrap();
        fs.write_synced(p("/r/1.tmp"), b"new").unwrap();

        assert!(fs.rename(p("/r/1.tmp"), p("/r/sub/doc.md")).is_err());
        assert!(fs.exists(p("/r/1.tmp")));
    }

    #[test]
    fn append_extends() {
        let fs = InMemoryFs::new();
        fs.append_synced(p("/log"), b"a").unwrap();
        fs.append_synced(p("/log"), b"b").unwrap();
        assert_eq!(fs.read(p("/log")).unwrap(), b"ab");
    }

    #[test]
    fn remove_then_missing() {
        let fs = InMemoryFs::new();
        fs.write_synced(p("/x"), b"1").unwrap();
        fs.remove(p("/x")).unwrap();
        assert!(!fs.exists(p("/x")));
        assert!(fs.remove(p("/x")).unwrap_err().is_not_found());
    }

    #[test]
    fn list_files_is_not_recursive() {
        let fs = InMemoryFs::new();
        fs.create_dir_all(p("/r/a")).unwrap();
        fs.write_synced(p("/r/1"), b"").unwrap();
        fs.write_synced(p("/r/a/2"), b"").unwrap();

        assert_eq!(fs.list_files(p("/r")).unwrap(), vec![PathBuf::from("/r/1")]);
    }

    #[test]
    fn files_under_filters_by_prefix() {
        let fs = InMemoryFs::new();
        fs.create_dir_all(p("/r/a")).unwrap();
        fs.create_dir_all(p("/r/b")).unwrap();
        fs.write_synced(p("/r/a/1"), b"").unwrap();
        fs.write_synced(p("/r/b/2"), b"").unwrap();

        assert_eq!(fs.files_under(p("/r/a")), vec![PathBuf::from("/r/a/1")]);
    }
}
