//! Store-wide properties: atomicity, isolation, rollback and retention.

use docvault_core::{
    Checksum, Config, DocPath, DocumentManager, LockTable, ManualClock, Metadata, StoreError,
    StoreStats, TransactionId,
};
use docvault_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Where a save is made to fail.
#[derive(Debug, Clone, Copy)]
enum FailurePoint {
    StagingWrite,
    StagedReadBack,
    Publish,
    PublishedReadBack,
    PublishedUnreadable,
}

impl FailurePoint {
    fn rule(self) -> FaultRule {
        match self {
            Self::StagingWrite => FaultRule::new(FaultOp::Write).on_path(".tmp").once(),
            Self::StagedReadBack => FaultRule::new(FaultOp::Read).on_path(".tmp").corrupt().once(),
            Self::Publish => FaultRule::new(FaultOp::Rename).on_path("doc.bin").once(),
            // The first read of the document is the backup snapshot
            Self::PublishedReadBack => FaultRule::new(FaultOp::Read)
                .on_path("doc.bin")
                .corrupt()
                .skip(1)
                .once(),
            Self::PublishedUnreadable => FaultRule::new(FaultOp::Read)
                .on_path("doc.bin")
                .skip(1)
                .once(),
        }
    }
}

fn failure_point_strategy() -> impl Strategy<Value = FailurePoint> {
    prop_oneof![
        Just(FailurePoint::StagingWrite),
        Just(FailurePoint::StagedReadBack),
        Just(FailurePoint::Publish),
        Just(FailurePoint::PublishedReadBack),
        Just(FailurePoint::PublishedUnreadable),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// A successful save leaves exactly the saved bytes behind.
    #[test]
    fn committed_content_reads_back(
        path in doc_path_strategy(),
        content in content_strategy(),
        metadata in metadata_strategy(),
    ) {
        let store = TestStore::memory();
        let outcome = store.save(&path, content.clone(), metadata).unwrap();

        let stored = store.read(&path).unwrap();
        prop_assert_eq!(&stored, &content);
        prop_assert_eq!(outcome.checksum, Checksum::of(&stored));
        prop_assert_eq!(outcome.size, content.len() as u64);
        prop_assert!(store.staging_files().is_empty());
    }

    /// A failed save leaves the previous bytes behind, wherever it failed.
    #[test]
    fn failed_save_restores_previous_content(
        before in content_strategy(),
        after in content_strategy(),
        point in failure_point_strategy(),
    ) {
        let store = TestStore::faulty();
        store.save("doc.bin", before.clone(), Metadata::new()).unwrap();

        store.faults().inject(point.rule());
        let result = store.save("doc.bin", after, Metadata::new());

        prop_assert!(result.is_err(), "{:?} did not fail the save", point);
        prop_assert_eq!(store.read("doc.bin").unwrap(), before);
        prop_assert_eq!(store.statistics().rollbacks, 1);
        prop_assert_eq!(store.statistics().rollback_failures, 0);
        prop_assert!(store.staging_files().is_empty());
    }

    /// A failed first save leaves no document behind.
    #[test]
    fn failed_first_save_leaves_nothing(
        content in content_strategy(),
        point in failure_point_strategy(),
    ) {
        let store = TestStore::faulty();
        // A first save has no snapshot read, so published-read faults fire
        // on the verification read without skipping
        let rule = match point {
            FailurePoint::PublishedReadBack => FaultRule::new(FaultOp::Read)
                .on_path("doc.bin")
                .corrupt()
                .once(),
            FailurePoint::PublishedUnreadable => {
                FaultRule::new(FaultOp::Read).on_path("doc.bin").once()
            }
            other => other.rule(),
        };
        store.faults().inject(rule);

        prop_assert!(store.save("doc.bin", content, Metadata::new()).is_err());
        prop_assert!(!store.fs().exists(&store.doc_path("doc.bin")));
        prop_assert!(store.history("doc.bin").unwrap().backups.is_empty());
    }

    /// Only the newest `max_backups` snapshots survive.
    #[test]
    fn backups_are_bounded_and_newest(saves in 1usize..12, max_backups in 1usize..5) {
        let store = TestStore::memory_with(Config::default().max_backups(max_backups));
        for i in 0..saves {
            store.clock.advance(1);
            store.save("doc.md", format!("v{i}").into_bytes(), Metadata::new()).unwrap();
        }

        // Every save but the first snapshots the previous version
        let expected = (saves - 1).min(max_backups);
        let backups = store.history("doc.md").unwrap().backups;
        prop_assert_eq!(backups.len(), expected);
        prop_assert_eq!(store.backup_files().len(), expected);

        let ids: Vec<String> = backups
            .iter()
            .map(|b| b.snapshot.transaction_id.to_string())
            .collect();
        let newest: Vec<String> = (saves - expected + 1..=saves)
            .map(|n| format!("txn_{n}"))
            .collect();
        prop_assert_eq!(ids, newest);
        prop_assert!(backups.windows(2).all(|w| w[0].snapshot.created_at < w[1].snapshot.created_at));
    }

    /// Invalid paths never reach the filesystem.
    #[test]
    fn invalid_paths_are_rejected(path in invalid_path_strategy()) {
        let store = TestStore::memory();
        let err = store.save(&path, b"x".to_vec(), Metadata::new()).unwrap_err();
        prop_assert!(matches!(err, StoreError::InvalidPath { .. }), "{err:?}");
        prop_assert_eq!(store.statistics().failures, 0);
    }
}

#[test]
fn first_save_creates_no_backup() {
    let store = TestStore::memory();
    let outcome = store.save("new.md", b"fresh".to_vec(), Metadata::new()).unwrap();

    assert!(outcome.backup.is_none());
    assert!(store.history("new.md").unwrap().backups.is_empty());
    assert!(store.backup_files().is_empty());
}

#[test]
fn readers_never_see_partial_documents() {
    init_test_tracing();
    let store = TestStore::disk_with(Config::default().sync_directories(false));
    let size = 256 * 1024;
    let a = vec![b'a'; size];
    let b = vec![b'b'; size];
    store.save("big.bin", a.clone(), Metadata::new()).unwrap();

    let target = store.doc_path("big.bin");
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut reads = 0usize;
            while !done.load(Ordering::Acquire) {
                let bytes = std::fs::read(&target).unwrap();
                assert_eq!(bytes.len(), size, "observed a truncated document");
                let first = bytes[0];
                assert!(
                    bytes.iter().all(|&byte| byte == first),
                    "observed mixed content"
                );
                reads += 1;
            }
            reads
        });

        for i in 0..40 {
            let content = if i % 2 == 0 { b.clone() } else { a.clone() };
            store.save("big.bin", content, Metadata::new()).unwrap();
        }
        done.store(true, Ordering::Release);

        assert!(reader.join().unwrap() > 0);
    });
}

#[test]
fn same_path_saves_are_mutually_exclusive() {
    let store = Arc::new(DocumentManager::open_in_memory().unwrap());
    let config = StressConfig {
        threads: 8,
        saves_per_thread: 25,
        content_size: 128,
    };

    let result = stress_same_path(Arc::clone(&store), "shared.md", &config);

    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops + result.conflicts, result.total_ops);
    assert!(result.successful_ops > 0);

    let stats = store.statistics();
    assert_eq!(stats.saves as usize, result.successful_ops);
    assert_eq!(stats.conflicts as usize, result.conflicts);

    // The surviving content is one whole save, never a blend of two
    let content = store.read("shared.md").unwrap();
    let end = content.iter().position(|&c| c == b'\n').unwrap();
    let header = String::from_utf8_lossy(&content[..end]).to_string();
    let parts: Vec<&str> = header.split('-').collect();
    let writer: usize = parts[1].parse().unwrap();
    let i: usize = parts[3].parse().unwrap();
    assert_eq!(content, stress_content(writer, i, config.content_size));
}

#[test]
fn distinct_paths_never_conflict() {
    let store = Arc::new(DocumentManager::open_in_memory().unwrap());
    let config = StressConfig {
        threads: 6,
        saves_per_thread: 20,
        content_size: 64,
    };

    let result = stress_distinct_paths(Arc::clone(&store), "workers", &config);

    assert_eq!(result.conflicts, 0);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, result.total_ops);
    for t in 0..config.threads {
        let content = store.read(&format!("workers/t{t}.bin")).unwrap();
        assert_eq!(content, stress_content(t, config.saves_per_thread - 1, config.content_size));
    }
}

#[test]
fn releasing_twice_is_a_no_op() {
    let clock = Arc::new(ManualClock::new(0));
    let table = LockTable::new(Duration::from_secs(30), clock, Arc::new(StoreStats::new()));
    let path = DocPath::parse("doc.md").unwrap();
    let holder = TransactionId::from("txn_1");

    let guard = table.acquire(&path, &holder).unwrap();
    assert!(guard.release());
    assert!(!table.release(&path, &holder));
    assert!(!table.release(&path, &holder));
    assert!(table.is_empty());
}
