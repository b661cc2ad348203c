//! Per-document exclusive locks.
//!
//! The lock table serializes transactions on the same document path. It
//! never blocks: an acquisition either succeeds immediately or fails with
//! [`StoreError::Locked`], and the caller decides whether to retry.
//!
//! ## Abandoned locks
//!
//! A lock older than the configured timeout is treated as abandoned and is
//! handed to the next transaction that asks for it. This is a liveness
//! heuristic based on wall-clock age alone, not a lease: a holder that is
//! slow but still running can be preempted. Releases are matched against
//! the holder id, so a preempted holder releasing late does not free the
//! lock its successor now owns.

use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use crate::stats::StoreStats;
use crate::types::{DocPath, TransactionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An exclusive lock on one document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDescriptor {
    /// The locked document.
    pub path: DocPath,
    /// The transaction holding the lock.
    pub holder: TransactionId,
    /// When the lock was granted, in Unix milliseconds.
    pub acquired_at: u64,
}

impl LockDescriptor {
    /// Returns how long the lock has been held at `now`.
    #[must_use]
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.acquired_at)
    }
}

/// Maps document paths to the transaction that may write them.
pub struct LockTable {
    locks: Mutex<HashMap<DocPath, LockDescriptor>>,
    timeout_ms: u64,
    clock: Arc<dyn Clock>,
    stats: Arc<StoreStats>,
}

impl LockTable {
    /// Creates an empty lock table.
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>, stats: Arc<StoreStats>) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            clock,
            stats,
        }
    }

    /// Acquires the lock on `path` for `holder`.
    ///
    /// Succeeds when the path is free, already held by `holder`, or held
    /// by a lock older than the timeout (a takeover). The returned guard
    /// releases the lock when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another transaction holds a live
    /// lock. Each such refusal counts as a conflict.
    pub fn acquire(&self, path: &DocPath, holder: &TransactionId) -> StoreResult<LockGuard<'_>> {
        let now = self.clock.now_millis();
        let mut locks = self.locks.lock();

        if let Some(existing) = locks.get(path) {
            let age = existing.age(now);
            if existing.holder != *holder {
                if age <= self.timeout_ms {
                    self.stats.record_conflict();
                    debug!(%path, holder = %existing.holder, age_ms = age, "lock conflict");
                    return Err(StoreError::Locked {
                        path: path.to_string(),
                        holder: existing.holder.clone(),
                        age_ms: age,
                    });
                }
                warn!(
                    %path,
                    previous = %existing.holder,
                    next = %holder,
                    age_ms = age,
                    "taking over abandoned document lock"
                );
                self.stats.record_lock_takeover();
            }
        }

        locks.insert(
            path.clone(),
            LockDescriptor {
                path: path.clone(),
                holder: holder.clone(),
                acquired_at: now,
            },
        );

        Ok(LockGuard {
            table: self,
            path: path.clone(),
            holder: holder.clone(),
            released: false,
        })
    }

    /// Releases the lock on `path` if `holder` still owns it.
    ///
    /// Idempotent: returns false, and does nothing, if the path is not
    /// locked or the lock has since passed to another transaction.
    pub fn release(&self, path: &DocPath, holder: &TransactionId) -> bool {
        let mut locks = self.locks.lock();
        match locks.get(path) {
            Some(existing) if existing.holder == *holder => {
                locks.remove(path);
                true
            }
            Some(existing) => {
                warn!(
                    %path,
                    stale = %holder,
                    current = %existing.holder,
                    "ignoring release from a preempted lock holder"
                );
                false
            }
            None => false,
        }
    }

    /// Returns the current lock on `path`, expired or not.
    pub fn holder(&self, path: &DocPath) -> Option<LockDescriptor> {
        self.locks.lock().get(path).cloned()
    }

    /// Returns true if `path` is held by a live (unexpired) lock.
    pub fn is_locked(&self, path: &DocPath) -> bool {
        let now = self.clock.now_millis();
        self.locks
            .lock()
            .get(path)
            .is_some_and(|l| l.age(now) <= self.timeout_ms)
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no locks are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a document lock until dropped or explicitly released.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    table: &'a LockTable,
    path: DocPath,
    holder: TransactionId,
    released: bool,
}

impl LockGuard<'_> {
    /// Returns the locked path.
    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// Returns the holding transaction.
    pub fn holder(&self) -> &TransactionId {
        &self.holder
    }

    /// Releases the lock now. Returns false if it had been taken over.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.table.release(&self.path, &self.holder)
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .field("holder", &self.holder)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.table.release(&self.path, &self.holder);
        }
    }
}
