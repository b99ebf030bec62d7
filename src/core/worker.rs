//! Worker implementation for smithypool.
//!
//! Workers are the individual "blacksmiths" of the pool: each one pulls the
//! next task off the shared queue, runs it to completion and calls the
//! completion hook, until the queue runs dry or the pool cancels it.

use crate::queue::BoundedQueue;
use crate::task::{CompletionHook, Task};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was closed and had nothing left
    Drained,
    /// The pool raised its cancellation signal
    Cancelled,
}

/// Counters shared by the pool and its workers.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) submitted: AtomicU64,
    pub(crate) rejected_full: AtomicU64,
    pub(crate) rejected_stopped: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) panicked: AtomicU64,
    pub(crate) active_workers: AtomicUsize,
}

/// Point-in-time statistics about a pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of workers the pool was built with
    pub worker_count: usize,
    /// Number of workers still running
    pub active_workers: usize,
    /// Tasks accepted but not yet picked up by a worker
    pub queued: usize,
    /// Tasks accepted by Submit
    pub submitted: u64,
    /// Submissions rejected with `QueueFull`
    pub rejected_full: u64,
    /// Submissions rejected with `Stopped`
    pub rejected_stopped: u64,
    /// Tasks that ran to completion
    pub completed: u64,
    /// Tasks that panicked
    pub panicked: u64,
}

impl PoolStats {
    /// Tasks that were picked up and finished, successfully or not.
    pub fn finished(&self) -> u64 {
        self.completed + self.panicked
    }

    /// Submissions rejected for any reason.
    pub fn rejected(&self) -> u64 {
        self.rejected_full + self.rejected_stopped
    }
}

impl PoolCounters {
    pub(crate) fn snapshot(&self, worker_count: usize, queued: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_workers: self.active_workers.load(Ordering::Relaxed),
            queued,
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_stopped: self.rejected_stopped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Individual worker that processes tasks
pub(crate) struct Worker {
    id: usize,
    queue: Arc<BoundedQueue<Task>>,
    cancel: CancellationToken,
    hook: Option<CompletionHook>,
    counters: Arc<PoolCounters>,
}

impl Worker {
    /// Create a new worker with the given ID
    pub(crate) fn new(
        id: usize,
        queue: Arc<BoundedQueue<Task>>,
        cancel: CancellationToken,
        hook: Option<CompletionHook>,
        counters: Arc<PoolCounters>,
    ) -> Self {
        Self {
            id,
            queue,
            cancel,
            hook,
            counters,
        }
    }

    /// Run the worker loop
    ///
    /// The caller has already counted this worker as active; the count is
    /// dropped here on exit.
    pub(crate) async fn run(self) -> WorkerExit {
        tracing::debug!("🔨 Worker {} starting forge", self.id);

        let exit = loop {
            // Cancellation wins over a ready task so that nothing new starts
            // once the signal is raised.
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(WorkerExit::Cancelled),
                entry = self.queue.pop() => entry.ok_or(WorkerExit::Drained),
            };

            let (task, slot) = match next {
                Ok(entry) => entry,
                Err(exit) => break exit,
            };

            self.execute(task).await;
            drop(slot);
            self.notify_completion();
        };

        self.counters.active_workers.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!("🔨 Worker {} finished with cause: {:?}", self.id, exit);
        exit
    }

    /// Execute a single task
    async fn execute(&self, task: Task) {
        let start_time = Instant::now();

        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(()) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    "🔨 Worker {} completed task in {:?}",
                    self.id,
                    start_time.elapsed()
                );
            }
            Err(panic) => {
                self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    "🔨 Worker {} task panicked after {:?}: {}",
                    self.id,
                    start_time.elapsed(),
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    fn notify_completion(&self) {
        let Some(hook) = &self.hook else {
            return;
        };

        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| hook())) {
            tracing::error!(
                "🔨 Worker {} completion hook panicked: {}",
                self.id,
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
