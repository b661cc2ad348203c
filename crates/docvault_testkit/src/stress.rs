//! Concurrent save helpers.
//!
//! These drive many threads against one store to check that saves of the
//! same path serialize and saves of different paths don't interfere.

use docvault_core::{DocumentManager, Metadata};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total saves attempted.
    pub total_ops: usize,
    /// Committed saves.
    pub successful_ops: usize,
    /// Saves refused with `Locked`.
    pub conflicts: usize,
    /// Saves that failed for any other reason.
    pub failed_ops: usize,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Returns committed saves per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.successful_ops as f64 / secs
        } else {
            0.0
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total saves: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Conflicts: {}", self.conflicts);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} saves/sec", self.ops_per_second());
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of threads.
    pub threads: usize,
    /// Saves per thread.
    pub saves_per_thread: usize,
    /// Content size in bytes.
    pub content_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            saves_per_thread: 50,
            content_size: 256,
        }
    }
}

/// Content written by `thread` on its `i`-th save: a recognizable header
/// followed by filler up to `size` bytes.
pub fn stress_content(thread: usize, i: usize, size: usize) -> Vec<u8> {
    let mut content = format!("thread-{thread}-save-{i}\n").into_bytes();
    let fill = b'a' + (thread % 26) as u8;
    content.resize(size.max(content.len()), fill);
    content
}

/// Every thread saves to `path` as fast as it can.
///
/// Threads start together behind a barrier so their saves overlap.
pub fn stress_same_path(
    store: Arc<DocumentManager>,
    path: &str,
    config: &StressConfig,
) -> StressTestResult {
    run(store, config, |_| path.to_string())
}

/// Each thread saves to its own path, `{prefix}/t{thread}.bin`.
pub fn stress_distinct_paths(
    store: Arc<DocumentManager>,
    prefix: &str,
    config: &StressConfig,
) -> StressTestResult {
    run(store, config, |t| format!("{prefix}/t{t}.bin"))
}

fn run<F>(store: Arc<DocumentManager>, config: &StressConfig, path_for: F) -> StressTestResult
where
    F: Fn(usize) -> String,
{
    let successful = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(config.threads));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let successful = Arc::clone(&successful);
            let conflicts = Arc::clone(&conflicts);
            let failed = Arc::clone(&failed);
            let barrier = Arc::clone(&barrier);
            let path = path_for(t);
            let saves = config.saves_per_thread;
            let size = config.content_size;

            thread::spawn(move || {
                barrier.wait();
                for i in 0..saves {
                    match store.save(&path, stress_content(t, i, size), Metadata::new()) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(e) if e.is_locked() => conflicts.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult {
        total_ops: config.threads * config.saves_per_thread,
        successful_ops: successful.load(Ordering::Relaxed),
        conflicts: conflicts.load(Ordering::Relaxed),
        failed_ops: failed.load(Ordering::Relaxed),
        duration: start.elapsed(),
    }
}
