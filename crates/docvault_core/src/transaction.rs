//! Save transaction state.

use crate::backup::BackupSnapshot;
use crate::checksum::Checksum;
use crate::error::{StoreError, StoreResult};
use crate::types::{DocPath, Metadata, TransactionId};
use serde::Serialize;

/// State of a save transaction.
///
/// ```text
/// Pending -> Written -> Verified -> Committed
///    \          \           \
///     +----------+-----------+----> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Created; nothing written yet.
    Pending,
    /// Content staged and published.
    Written,
    /// Published bytes read back and checked.
    Verified,
    /// Recorded as committed.
    Committed,
    /// Failed and rolled back.
    Failed,
}

impl TransactionState {
    /// Returns true for `Committed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Written)
                | (Self::Written, Self::Verified)
                | (Self::Verified, Self::Committed)
                | (Self::Pending | Self::Written | Self::Verified, Self::Failed)
        )
    }
}

/// One attempted save of one document.
///
/// Lives only for the duration of a `save` call; afterwards it is reduced
/// to a [`crate::LogEntry`] and a [`TransactionSummary`].
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    path: DocPath,
    content: Vec<u8>,
    checksum: Checksum,
    metadata: Metadata,
    backup: Option<BackupSnapshot>,
    state: TransactionState,
    start_time: u64,
    end_time: Option<u64>,
}

impl Transaction {
    /// Creates a pending transaction.
    pub(crate) fn new(
        id: TransactionId,
        path: DocPath,
        content: Vec<u8>,
        metadata: Metadata,
        start_time: u64,
    ) -> Self {
        let checksum = Checksum::of(&content);
        Self {
            id,
            path,
            content,
            checksum,
            metadata,
            backup: None,
            state: TransactionState::Pending,
            start_time,
            end_time: None,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// Returns the content being saved.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Returns the checksum of the content as supplied.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Returns the caller's metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the snapshot taken before writing, if any.
    #[must_use]
    pub fn backup(&self) -> Option<&BackupSnapshot> {
        self.backup.as_ref()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns the start time in Unix milliseconds.
    #[must_use]
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Returns the end time once the transaction is terminal.
    #[must_use]
    pub fn end_time(&self) -> Option<u64> {
        self.end_time
    }

    /// Returns how long the transaction ran, measured up to `now` if it
    /// has not finished.
    #[must_use]
    pub fn duration_ms(&self, now: u64) -> u64 {
        self.end_time.unwrap_or(now).saturating_sub(self.start_time)
    }

    pub(crate) fn attach_backup(&mut self, backup: Option<BackupSnapshot>) {
        self.backup = backup;
    }

    /// Moves to `next`, rejecting out-of-order transitions.
    pub(crate) fn advance(&mut self, next: TransactionState, now: u64) -> StoreResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(StoreError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.end_time = Some(now);
        }
        Ok(())
    }

    /// Reduces the transaction to a summary without the content bytes.
    #[must_use]
    pub fn summary(&self) -> TransactionSummary {
        TransactionSummary {
            id: self.id.clone(),
            path: self.path.clone(),
            size: self.content.len() as u64,
            checksum: self.checksum,
            metadata: self.metadata.clone(),
            backup_id: self.backup.as_ref().map(|b| b.transaction_id.clone()),
            state: self.state,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// A transaction as reported to event subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSummary {
    /// Transaction id.
    pub id: TransactionId,
    /// Document path.
    pub path: DocPath,
    /// Content size in bytes.
    pub size: u64,
    /// Content checksum.
    pub checksum: Checksum,
    /// Caller metadata.
    pub metadata: Metadata,
    /// Id of the backup taken before writing.
    pub backup_id: Option<TransactionId>,
    /// Final state.
    pub state: TransactionState,
    /// Start time in Unix milliseconds.
    pub start_time: u64,
    /// End time in Unix milliseconds.
    pub end_time: Option<u64>,
}
