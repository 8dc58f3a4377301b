//! Background progress monitor for batch runs.
//!
//! Periodically logs batch statistics (jobs dispatched, agent replies,
//! evaluations, resolutions) so operators can track long-running batches
//! without parsing individual job lines.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Snapshot of batch progress counters at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Jobs handed to a worker.
    pub dispatched: usize,
    /// Jobs whose participant call produced a reply.
    pub agent_replies: usize,
    /// Jobs whose participant could not be reached.
    pub agent_failures: usize,
    /// Jobs with a harness outcome recorded.
    pub evaluated: usize,
    /// Jobs whose harness faulted.
    pub eval_faults: usize,
    /// Jobs whose outcome resolved the task.
    pub resolved: usize,
    /// Jobs in their terminal state.
    pub done: usize,
    /// Wall-clock elapsed time since the monitor started.
    pub elapsed: Duration,
}

/// Shared atomic counters for batch progress tracking.
///
/// Cloned into worker tasks and incremented via `fetch_add`. The
/// background monitor reads these periodically to emit progress logs.
#[derive(Debug, Clone)]
pub struct ProgressCounters {
    /// Jobs handed to a worker.
    pub dispatched: Arc<AtomicUsize>,
    /// Jobs whose participant call produced a reply.
    pub agent_replies: Arc<AtomicUsize>,
    /// Jobs whose participant could not be reached.
    pub agent_failures: Arc<AtomicUsize>,
    /// Jobs with a harness outcome recorded.
    pub evaluated: Arc<AtomicUsize>,
    /// Jobs whose harness faulted.
    pub eval_faults: Arc<AtomicUsize>,
    /// Jobs whose outcome resolved the task.
    pub resolved: Arc<AtomicUsize>,
    /// Jobs in their terminal state.
    pub done: Arc<AtomicUsize>,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    /// Create a new set of zeroed progress counters.
    pub fn new() -> Self {
        Self {
            dispatched: Arc::new(AtomicUsize::new(0)),
            agent_replies: Arc::new(AtomicUsize::new(0)),
            agent_failures: Arc::new(AtomicUsize::new(0)),
            evaluated: Arc::new(AtomicUsize::new(0)),
            eval_faults: Arc::new(AtomicUsize::new(0)),
            resolved: Arc::new(AtomicUsize::new(0)),
            done: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take a snapshot of the current counter values.
    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            agent_replies: self.agent_replies.load(Ordering::Relaxed),
            agent_failures: self.agent_failures.load(Ordering::Relaxed),
            evaluated: self.evaluated.load(Ordering::Relaxed),
            eval_faults: self.eval_faults.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// A background task that periodically logs batch progress.
///
/// Spawns a tokio task that wakes every `interval` and logs a summary
/// of the batch counters. Call [`ProgressMonitor::stop`] to cancel.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start a background progress monitor that logs every `interval`.
    ///
    /// # Arguments
    ///
    /// * `counters` - Shared atomic counters incremented by workers
    /// * `total_jobs` - Number of jobs in the batch (used for percentage)
    /// * `interval` - How often to emit progress logs
    pub fn start(counters: ProgressCounters, total_jobs: usize, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                let pct = if total_jobs > 0 {
                    (snap.done as f64 / total_jobs as f64 * 100.0).min(100.0)
                } else {
                    0.0
                };

                let elapsed_secs = snap.elapsed.as_secs_f64();
                let done_per_sec = if elapsed_secs > 0.0 {
                    snap.done as f64 / elapsed_secs
                } else {
                    0.0
                };

                tracing::info!(
                    dispatched = snap.dispatched,
                    agent_replies = snap.agent_replies,
                    agent_failures = snap.agent_failures,
                    evaluated = snap.evaluated,
                    eval_faults = snap.eval_faults,
                    resolved = snap.resolved,
                    done = snap.done,
                    total_jobs = total_jobs,
                    progress_pct = format!("{:.1}%", pct),
                    elapsed_secs = snap.elapsed.as_secs(),
                    done_per_sec = format!("{:.2}", done_per_sec),
                    "Batch progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signal the background monitor to stop and wait for it to finish.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}
