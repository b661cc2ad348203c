//! Fault injection for filesystem operations.
//!
//! [`FaultyFs`] wraps another [`DocumentFs`] and consults a list of
//! [`FaultRule`]s before every call. A matching rule fails the call with an
//! injected I/O error, hands back damaged bytes for reads, or parks the
//! calling thread at a [`Gate`] until the test lets it continue.
//!
//! Paths are matched by suffix, so `on_path("doc.md")` hits
//! `/store/doc.md` but not the backup `/store/.docvault/backups/doc.md.txn_2.backup`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let fs = Arc::new(FaultyFs::new(Arc::new(InMemoryFs::new())));
//!
//! // Fail the first rename onto doc.md
//! fs.inject(FaultRule::new(FaultOp::Rename).on_path("doc.md").once());
//!
//! // Corrupt the second read of doc.md (the first is the backup snapshot)
//! fs.inject(FaultRule::new(FaultOp::Read).on_path("doc.md").corrupt().skip(1).once());
//! ```

use docvault_storage::{DocumentFs, StorageError, StorageResult};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A filesystem operation that can be faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    /// `read`
    Read,
    /// `write_synced`
    Write,
    /// `append_synced`
    Append,
    /// `rename`, matched against the destination
    Rename,
    /// `remove`
    Remove,
    /// `create_dir_all`
    CreateDir,
    /// `sync_dir`
    SyncDir,
}

impl FaultOp {
    fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Append => "append",
            Self::Rename => "rename",
            Self::Remove => "remove",
            Self::CreateDir => "create_dir",
            Self::SyncDir => "sync_dir",
        }
    }
}

/// What a matching rule does.
#[derive(Debug, Clone)]
pub enum FaultAction {
    /// Fail with an injected I/O error.
    Fail,
    /// Reads only: flip the bits of the first byte (or invent one).
    Corrupt,
    /// Reads only: return no bytes.
    Truncate,
    /// Block the calling thread at the gate, then carry on normally.
    Pause(Arc<Gate>),
}

/// A one-shot rendezvous between a paused filesystem call and a test.
///
/// The paused thread marks the gate reached and blocks until the test
/// opens it.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    reached: bool,
    open: bool,
}

impl Gate {
    /// Creates a closed gate.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Waits up to `timeout` for a call to reach the gate.
    ///
    /// Returns false on timeout.
    pub fn wait_reached(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.reached {
            if self.cv.wait_until(&mut state, deadline).timed_out() {
                return state.reached;
            }
        }
        true
    }

    /// Releases the paused call and every later one.
    pub fn open(&self) {
        self.state.lock().open = true;
        self.cv.notify_all();
    }

    fn arrive(&self) {
        let mut state = self.state.lock();
        state.reached = true;
        self.cv.notify_all();
        while !state.open {
            self.cv.wait(&mut state);
        }
    }
}

/// One injected fault.
#[derive(Debug, Clone)]
pub struct FaultRule {
    op: FaultOp,
    suffix: Option<String>,
    action: FaultAction,
    skip: usize,
    remaining: Option<usize>,
}

impl FaultRule {
    /// Creates a rule failing every call of `op`.
    pub fn new(op: FaultOp) -> Self {
        Self {
            op,
            suffix: None,
            action: FaultAction::Fail,
            skip: 0,
            remaining: None,
        }
    }

    /// Only matches paths ending with `suffix`.
    #[must_use]
    pub fn on_path(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Corrupts read bytes instead of failing.
    #[must_use]
    pub fn corrupt(mut self) -> Self {
        self.action = FaultAction::Corrupt;
        self
    }

    /// Returns empty read bytes instead of failing.
    #[must_use]
    pub fn truncate(mut self) -> Self {
        self.action = FaultAction::Truncate;
        self
    }

    /// Pauses matching calls at `gate` instead of failing them.
    #[must_use]
    pub fn pause(mut self, gate: &Arc<Gate>) -> Self {
        self.action = FaultAction::Pause(Arc::clone(gate));
        self
    }

    /// Lets the first `n` matching calls through.
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    /// Fires at most `n` times, then retires.
    #[must_use]
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    /// Fires once.
    #[must_use]
    pub fn once(self) -> Self {
        self.times(1)
    }

    fn matches(&self, op: FaultOp, path: &Path) -> bool {
        self.op == op
            && self
                .suffix
                .as_deref()
                .map_or(true, |s| path.to_string_lossy().ends_with(s))
    }
}

/// A filesystem that injects faults into another one.
pub struct FaultyFs {
    inner: Arc<dyn DocumentFs>,
    rules: Mutex<Vec<FaultRule>>,
    injected: AtomicUsize,
}

impl FaultyFs {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: Arc<dyn DocumentFs>) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
            injected: AtomicUsize::new(0),
        }
    }

    /// Arms a fault.
    pub fn inject(&self, rule: FaultRule) {
        self.rules.lock().push(rule);
    }

    /// Disarms all faults.
    pub fn clear(&self) {
        self.rules.lock().clear();
    }

    /// Returns how many faults have fired.
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    /// Returns the wrapped filesystem.
    pub fn inner(&self) -> &Arc<dyn DocumentFs> {
        &self.inner
    }

    /// Finds the first live rule for this call and consumes one firing.
    fn check(&self, op: FaultOp, path: &Path) -> Option<FaultAction> {
        let mut rules = self.rules.lock();
        let index = rules.iter().position(|r| r.matches(op, path))?;

        let rule = &mut rules[index];
        if rule.skip > 0 {
            rule.skip -= 1;
            return None;
        }

        let action = rule.action.clone();
        let exhausted = match rule.remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            rules.remove(index);
        }

        self.injected.fetch_add(1, Ordering::SeqCst);
        Some(action)
    }

    fn fail_if_armed(&self, op: FaultOp, path: &Path) -> StorageResult<()> {
        match self.check(op, path) {
            None => Ok(()),
            Some(FaultAction::Pause(gate)) => {
                gate.arrive();
                Ok(())
            }
            Some(_) => Err(injected(op, path)),
        }
    }
}

fn injected(op: FaultOp, path: &Path) -> StorageError {
    StorageError::Io {
        op: op.name(),
        path: path.to_path_buf(),
        source: io::Error::other("injected fault"),
    }
}

impl DocumentFs for FaultyFs {
    fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
        match self.check(FaultOp::Read, path) {
            None => self.inner.read(path),
            Some(FaultAction::Pause(gate)) => {
                gate.arrive();
                self.inner.read(path)
            }
            Some(FaultAction::Fail) => Err(injected(FaultOp::Read, path)),
            Some(FaultAction::Truncate) => self.inner.read(path).map(|_| Vec::new()),
            Some(FaultAction::Corrupt) => self.inner.read(path).map(|mut bytes| {
                match bytes.first_mut() {
                    Some(b) => *b = !*b,
                    None => bytes.push(0xFF),
                }
                bytes
            }),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn write_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.fail_if_armed(FaultOp::Write, path)?;
        self.inner.write_synced(path, data)
    }

    fn append_synced(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.fail_if_armed(FaultOp::Append, path)?;
        self.inner.append_synced(path, data)
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        self.fail_if_armed(FaultOp::Rename, to)?;
        self.inner.rename(from, to)
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        self.fail_if_armed(FaultOp::Remove, path)?;
        self.inner.remove(path)
    }

    fn create_dir_all(&self, path: &Path) -> StorageResult<()> {
        self.fail_if_armed(FaultOp::CreateDir, path)?;
        self.inner.create_dir_all(path)
    }

    fn list_files(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        self.inner.list_files(dir)
    }

    fn sync_dir(&self, path: &Path) -> StorageResult<()> {
        self.fail_if_armed(FaultOp::SyncDir, path)?;
        self.inner.sync_dir(path)
    }
}
