//! Store configuration.

use std::time::Duration;

/// Configuration for opening a document store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store root if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to take the advisory `LOCK` file so only one process writes
    /// to the root at a time. Only applies to on-disk stores.
    pub exclusive: bool,

    /// Age after which a document lock is considered abandoned and may be
    /// taken over by another transaction.
    pub lock_timeout: Duration,

    /// Maximum number of backups retained per document.
    pub max_backups: usize,

    /// Maximum number of transaction log entries kept in memory.
    pub max_log_entries: usize,

    /// Default retention used by [`crate::DocumentManager::prune_log_default`].
    pub log_retention_days: u64,

    /// Whether to persist the transaction log as JSON lines.
    pub persist_log: bool,

    /// Whether to fsync parent directories after publishing (safer but slower).
    pub sync_directories: bool,

    /// Number of past events kept for polling.
    pub max_event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            exclusive: true,
            lock_timeout: Duration::from_secs(30),
            max_backups: 5,
            max_log_entries: 10_000,
            log_retention_days: 7,
            persist_log: false,
            sync_directories: true,
            max_event_history: 1_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store root if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to hold the advisory process lock.
    #[must_use]
    pub const fn exclusive(mut self, value: bool) -> Self {
        self.exclusive = value;
        self
    }

    /// Sets the abandoned-lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the per-document backup bound.
    #[must_use]
    pub const fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    /// Sets the in-memory transaction log bound.
    #[must_use]
    pub const fn max_log_entries(mut self, count: usize) -> Self {
        self.max_log_entries = count;
        self
    }

    /// Sets the default log retention in days.
    #[must_use]
    pub const fn log_retention_days(mut self, days: u64) -> Self {
        self.log_retention_days = days;
        self
    }

    /// Sets whether to persist the transaction log.
    #[must_use]
    pub const fn persist_log(mut self, value: bool) -> Self {
        self.persist_log = value;
        self
    }

    /// Sets whether to fsync directories after publishing.
    #[must_use]
    pub const fn sync_directories(mut self, value: bool) -> Self {
        self.sync_directories = value;
        self
    }

    /// Sets the event history bound.
    #[must_use]
    pub const fn max_event_history(mut self, count: usize) -> Self {
        self.max_event_history = count;
        self
    }
}
