//! Store statistics.
//!
//! Counters are process-wide for one store, start at zero and only ever
//! increase.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = DocumentManager::open(Path::new("artifacts"))?;
//! store.save("doc.md", b"hello".to_vec(), Metadata::new())?;
//!
//! let stats = store.statistics();
//! println!("Saves: {}", stats.saves);
//! println!("Conflicts: {}", stats.conflicts);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Store statistics.
///
/// All counters are atomic and can be read while saves are in progress.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Committed saves.
    saves: AtomicU64,
    /// Saves that were rolled back.
    rollbacks: AtomicU64,
    /// Lock acquisitions refused because another transaction held the lock.
    conflicts: AtomicU64,
    /// Failed saves (every rollback is also a failure).
    failures: AtomicU64,
    /// Explicit restores from backup.
    restores: AtomicU64,
    /// Abandoned locks taken over after the timeout.
    lock_takeovers: AtomicU64,
    /// Rollbacks that could not put the previous content back.
    rollback_failures: AtomicU64,
    /// Bytes of committed document content.
    bytes_written: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_save(&self, bytes: u64) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restore(&self) {
        self.restores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_takeover(&self) {
        self.lock_takeovers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback_failure(&self) {
        self.rollback_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of committed saves.
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Returns the number of rolled back saves.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Returns the number of lock conflicts.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of failed saves.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            saves: self.saves(),
            rollbacks: self.rollbacks(),
            conflicts: self.conflicts(),
            failures: self.failures(),
            restores: self.restores.load(Ordering::Relaxed),
            lock_takeovers: self.lock_takeovers.load(Ordering::Relaxed),
            rollback_failures: self.rollback_failures.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of store statistics.
///
/// Unlike `StoreStats`, this is a plain value that can be serialized,
/// compared, or passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Committed saves.
    pub saves: u64,
    /// Rolled back saves.
    pub rollbacks: u64,
    /// Lock conflicts.
    pub conflicts: u64,
    /// Failed saves.
    pub failures: u64,
    /// Explicit restores.
    pub restores: u64,
    /// Abandoned lock takeovers.
    pub lock_takeovers: u64,
    /// Failed rollbacks.
    pub rollback_failures: u64,
    /// Committed content bytes.
    pub bytes_written: u64,
}
