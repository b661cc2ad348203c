//! Time sources and transaction id generation.
//!
//! Both are injected into the store so tests can drive lock expiry and
//! produce predictable ids without sleeping.

use crate::types::TransactionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// A source of wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock reading `start` milliseconds.
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute reading.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Produces transaction ids.
///
/// Ids only have to be unique within one store's backup and staging
/// namespaces, and must be usable as file name components.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh id. `now_millis` is the store clock's reading.
    fn next_id(&self, now_millis: u64) -> TransactionId;
}

/// Time-based ids with a random suffix: `txn_{millis}_{8 hex chars}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self, now_millis: u64) -> TransactionId {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        TransactionId::new(format!("txn_{now_millis}_{}", &suffix[..8]))
    }
}

/// Deterministic ids: `txn_1`, `txn_2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, _now_millis: u64) -> TransactionId {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        TransactionId::new(format!("txn_{n}"))
    }
}
