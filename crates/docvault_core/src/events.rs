//! Lifecycle events for observing the store.
//!
//! The event feed emits one event per lifecycle step of a save or restore,
//! enabling:
//! - Indexers that react to newly saved documents
//! - Alerting on rollbacks and failed rollbacks
//! - Audit trails
//!
//! Delivery is in-process only; there is no durable event log.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = DocumentManager::open(Path::new("artifacts"))?;
//! let events = store.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = events.recv() {
//!         println!("{:?}", event.kind);
//!     }
//! });
//!
//! store.save("doc.md", b"hello".to_vec(), Metadata::new())?;
//! ```

use crate::transaction::TransactionSummary;
use crate::types::{DocPath, TransactionId};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    /// A document was written and verified.
    DocumentSaved {
        /// Transaction id.
        transaction_id: TransactionId,
        /// Document path.
        path: DocPath,
        /// Content size in bytes.
        size: u64,
        /// Save duration.
        duration_ms: u64,
    },
    /// A transaction reached the committed state.
    TransactionCommitted {
        /// The committed transaction.
        transaction: TransactionSummary,
    },
    /// A failed save was rolled back.
    DocumentRollback {
        /// Transaction id.
        transaction_id: TransactionId,
        /// Document path.
        path: DocPath,
        /// Backup written back, if there was one.
        backup_path: Option<PathBuf>,
        /// Why the save failed.
        reason: String,
    },
    /// Rolling back a failed save did not succeed; the document may hold
    /// partial or unexpected content.
    RollbackFailed {
        /// Transaction id.
        transaction_id: TransactionId,
        /// Document path.
        path: DocPath,
        /// Why the rollback failed.
        error: String,
    },
    /// A document was explicitly restored from a backup.
    BackupRestored {
        /// Id of the restore operation.
        transaction_id: TransactionId,
        /// Document path.
        path: DocPath,
        /// The backup that was restored.
        backup_id: TransactionId,
    },
}

/// A single event from the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreEvent {
    /// Emission order, starting at 1.
    pub sequence: u64,
    /// When the event was emitted, in Unix milliseconds.
    pub timestamp: u64,
    /// The event payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// A feed that distributes store events to subscribers.
///
/// The feed:
/// - Preserves emission order
/// - Supports multiple subscribers
/// - Keeps a bounded history for polling
/// - Is thread-safe
pub struct EventFeed {
    subscribers: RwLock<Vec<Sender<StoreEvent>>>,
    history: RwLock<VecDeque<StoreEvent>>,
    max_history: usize,
    next_sequence: AtomicU64,
}

impl EventFeed {
    /// Creates a feed keeping up to `max_history` past events.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver for all future events. Drop it to unsubscribe.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers and returns its sequence number.
    pub fn emit(&self, kind: EventKind, timestamp: u64) -> u64 {
        // The subscriber lock is held from sequence assignment through the
        // sends, so every receiver sees events in sequence order.
        let mut subscribers = self.subscribers.write();

        let event = {
            let mut history = self.history.write();
            let event = StoreEvent {
                sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
                timestamp,
                kind,
            };
            history.push_back(event.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
            event
        };

        // Send to subscribers (remove disconnected ones)
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        event.sequence
    }

    /// Returns events with sequence > `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<StoreEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number emitted, or 0.
    pub fn latest_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst) - 1
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::with_max_history(1_000)
    }
}
