//! Failure handling: best-effort backups, failed rollbacks and reopen.

use docvault_core::{
    Config, DocumentManager, EventKind, Metadata, RollbackOutcome, StorageError, StoreError,
    VerifyStage,
};
use docvault_testkit::prelude::*;
use tempfile::TempDir;

fn seeded() -> TestStore {
    let store = TestStore::faulty();
    store.save("doc.md", b"v1".to_vec(), Metadata::new()).unwrap();
    store
}

#[test]
fn failed_backup_does_not_block_the_save() {
    init_test_tracing();
    let store = seeded();
    store
        .faults()
        .inject(FaultRule::new(FaultOp::Write).on_path(".backup").once());

    let outcome = store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap();

    assert!(outcome.backup.is_none());
    assert_eq!(store.read("doc.md").unwrap(), b"v2");
    assert!(store.history("doc.md").unwrap().backups.is_empty());
    assert_eq!(store.statistics().saves, 2);
}

#[test]
fn rollback_without_backup_is_reported() {
    init_test_tracing();
    let store = seeded();
    let events = store.subscribe();
    store
        .faults()
        .inject(FaultRule::new(FaultOp::Write).on_path(".backup").once());
    store.faults().inject(
        FaultRule::new(FaultOp::Read)
            .on_path("doc.md")
            .corrupt()
            .skip(1)
            .once(),
    );

    let err = store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap_err();

    // The caller sees the cause, not the rollback failure
    assert!(
        matches!(
            err,
            StoreError::ChecksumMismatch {
                stage: VerifyStage::Published,
                ..
            }
        ),
        "got {err:?}"
    );

    let stats = store.statistics();
    assert_eq!(stats.rollback_failures, 1);
    assert_eq!(stats.failures, 1);

    match events.try_recv().unwrap().kind {
        EventKind::RollbackFailed {
            transaction_id,
            error,
            ..
        } => {
            assert_eq!(transaction_id.as_str(), "txn_2");
            assert!(error.contains("no backups"), "error: {error}");
        }
        other => panic!("expected a rollback failure, got {other:?}"),
    }

    let last = store.history("doc.md").unwrap().transactions.pop().unwrap();
    assert_eq!(last.rollback, Some(RollbackOutcome::Failed));
}

#[test]
fn unreadable_document_after_publish_rolls_back() {
    let store = seeded();
    store
        .faults()
        .inject(FaultRule::new(FaultOp::Read).on_path("doc.md").skip(1).once());

    let err = store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap_err();

    assert!(matches!(err, StoreError::NotReadable { .. }), "got {err:?}");
    assert_eq!(store.read("doc.md").unwrap(), b"v1");
    assert_eq!(store.statistics().rollbacks, 1);
}

#[test]
fn staged_corruption_never_reaches_the_document() {
    let store = seeded();
    store
        .faults()
        .inject(FaultRule::new(FaultOp::Read).on_path(".tmp").corrupt().once());

    let err = store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap_err();

    assert!(
        matches!(
            err,
            StoreError::ChecksumMismatch {
                stage: VerifyStage::Staged,
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(store.read("doc.md").unwrap(), b"v1");
    assert!(store.staging_files().is_empty());
}

#[test]
fn truncated_read_back_is_a_mismatch() {
    let store = seeded();
    store.faults().inject(
        FaultRule::new(FaultOp::Read)
            .on_path("doc.md")
            .truncate()
            .skip(1)
            .once(),
    );

    let err = store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap_err();

    assert!(matches!(err, StoreError::ChecksumMismatch { .. }), "got {err:?}");
    assert_eq!(store.read("doc.md").unwrap(), b"v1");
}

#[test]
fn persistent_rename_failure_defeats_rollback() {
    init_test_tracing();
    let store = seeded();
    store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap();
    store
        .faults()
        .inject(FaultRule::new(FaultOp::Rename).on_path("doc.md"));

    let err = store.save("doc.md", b"v3".to_vec(), Metadata::new()).unwrap_err();

    assert!(matches!(err, StoreError::IoFailure(_)), "got {err:?}");
    // Nothing was published, so the document is intact even though the
    // restore could not run
    assert_eq!(store.read("doc.md").unwrap(), b"v2");
    assert_eq!(store.statistics().rollback_failures, 1);
    assert!(store.staging_files().is_empty());
}

#[test]
fn tampered_backup_is_refused() {
    let store = TestStore::memory();
    store.save("doc.md", b"v1".to_vec(), Metadata::new()).unwrap();
    let outcome = store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap();
    let backup = outcome.backup.unwrap();
    store
        .fs()
        .write_synced(&backup.backup_path, b"tampered")
        .unwrap();

    let err = store.restore_from_backup("doc.md", None).unwrap_err();

    assert!(
        matches!(
            err,
            StoreError::ChecksumMismatch {
                stage: VerifyStage::Backup,
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(store.read("doc.md").unwrap(), b"v2");
    assert_eq!(store.statistics().restores, 0);
}

#[test]
fn restore_of_unknown_backup_fails() {
    let store = TestStore::memory();
    store.save("doc.md", b"v1".to_vec(), Metadata::new()).unwrap();
    store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap();

    let err = store
        .restore_from_backup("doc.md", Some("txn_99".into()))
        .unwrap_err();
    assert!(matches!(err, StoreError::BackupNotFound { .. }), "got {err:?}");

    let err = store.restore_from_backup("other.md", None).unwrap_err();
    assert!(matches!(err, StoreError::NoBackups { .. }), "got {err:?}");
}

#[test]
fn log_write_failure_does_not_fail_the_save() {
    let store = TestStore::faulty_with(Config::default().persist_log(true));
    store
        .faults()
        .inject(FaultRule::new(FaultOp::Append).on_path("transactions.log").once());

    store.save("doc.md", b"v1".to_vec(), Metadata::new()).unwrap();

    assert_eq!(store.read("doc.md").unwrap(), b"v1");
    assert_eq!(store.faults().injected(), 1);
}

#[test]
fn persisted_log_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let config = Config::default().persist_log(true);

    {
        let store = DocumentManager::open_with_config(&root, config.clone()).unwrap();
        store.save("doc.md", b"v1".to_vec(), Metadata::new()).unwrap();
        store.save("doc.md", b"v2".to_vec(), Metadata::new()).unwrap();
    }

    let store = DocumentManager::open_with_config(&root, config).unwrap();
    let history = store.history("doc.md").unwrap();
    assert_eq!(history.transactions.len(), 2);
    assert_eq!(store.read("doc.md").unwrap(), b"v2");
}

#[test]
fn second_open_of_a_root_is_refused() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");

    let _first = DocumentManager::open(&root).unwrap();
    let second = DocumentManager::open(&root);

    assert!(matches!(second, Err(StoreError::StoreLocked)));
}

#[test]
fn missing_root_is_not_created_when_disallowed() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("absent");

    let result =
        DocumentManager::open_with_config(&root, Config::default().create_if_missing(false));

    assert!(
        matches!(
            result,
            Err(StoreError::IoFailure(StorageError::NotFound { .. }))
        ),
        "root should not be created"
    );
    assert!(!root.exists());
}

#[test]
fn reopen_sweeps_abandoned_staging_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("store");
    let staging = {
        let store = DocumentManager::open(&root).unwrap();
        store.save("doc.md", b"v1".to_vec(), Metadata::new()).unwrap();
        store.layout().staging_dir()
    };

    std::fs::write(staging.join("crashed.tmp"), b"half").unwrap();
    std::fs::write(staging.join("notes.txt"), b"kept").unwrap();

    let _store = DocumentManager::open(&root).unwrap();

    assert!(!staging.join("crashed.tmp").exists());
    assert!(staging.join("notes.txt").exists());
}
