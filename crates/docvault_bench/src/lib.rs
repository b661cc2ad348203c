//! Benchmark utilities.

use docvault_core::{Config, DocumentInput, DocumentManager, InMemoryFs};
use rand::Rng;
use std::sync::Arc;
use tempfile::TempDir;

/// Generate random document content of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` documents under `prefix` with payloads of `payload_size`.
pub fn generate_documents(prefix: &str, count: usize, payload_size: usize) -> Vec<DocumentInput> {
    (0..count)
        .map(|i| DocumentInput::new(format!("{prefix}/doc_{i}.bin"), random_data(payload_size)))
        .collect()
}

/// Opens an in-memory store with the given configuration.
pub fn memory_store(config: Config) -> DocumentManager {
    DocumentManager::builder("/bench")
        .config(config)
        .filesystem(Arc::new(InMemoryFs::new()))
        .open()
        .unwrap()
}

/// Opens an on-disk store in a fresh temporary directory.
///
/// The directory lives as long as the returned guard.
pub fn disk_store(config: Config) -> (TempDir, DocumentManager) {
    let dir = TempDir::new().unwrap();
    let store = DocumentManager::open_with_config(&dir.path().join("store"), config).unwrap();
    (dir, store)
}
