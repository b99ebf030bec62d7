//! The worker pool controller.
//!
//! [`WorkerPool`] owns the bounded queue and a fixed set of workers. It is the
//! only place in the crate with real concurrency invariants:
//!
//! - the stopped flag only ever goes from `false` to `true`;
//! - once it is `true`, nothing new gets into the queue;
//! - [`WorkerPool::submit`] never waits;
//! - [`WorkerPool::stop`] does not return before every worker has exited.

use crate::config::{PoolConfig, ShutdownPolicy};
use crate::error::{Error, PoolError, PoolResult, Result};
use crate::queue::{BoundedQueue, PushError};
use crate::task::{self, CompletionHook, Task};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod worker;

pub use worker::{PoolStats, WorkerExit};
use worker::{PoolCounters, Worker};

/// The two operations consumers of a pool rely on.
#[async_trait]
pub trait Pool: Send + Sync {
    /// Hand a task to the pool without waiting.
    fn submit_task(&self, task: Task) -> PoolResult<()>;

    /// Stop accepting work and wait for the workers to exit.
    async fn stop(&self);
}

/// State guarded by the pool's read/write lock.
struct Lifecycle {
    stopped: bool,
    workers: Vec<JoinHandle<WorkerExit>>,
}

/// A bounded, fixed-size worker pool.
///
/// # Examples
///
/// ```rust
/// use smithypool::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> smithypool::Result<()> {
///     let pool = WorkerPool::builder()
///         .workers(2)
///         .queue_capacity(8)
///         .on_complete(|| tracing::info!("Task completed"))
///         .build()?;
///
///     pool.submit(async { println!("hello from the pool") })?;
///     pool.stop().await;
///     Ok(())
/// }
/// ```
pub struct WorkerPool {
    config: PoolConfig,
    queue: Arc<BoundedQueue<Task>>,
    lifecycle: RwLock<Lifecycle>,
    cancel: CancellationToken,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Create a pool and start its workers.
    ///
    /// Must be called from within a tokio runtime; the workers are spawned on
    /// it immediately and idle until tasks arrive.
    pub fn new(config: PoolConfig, hook: Option<CompletionHook>) -> Result<Self> {
        Self::spawn(config, hook, None)
    }

    /// Like [`new`](Self::new), but workers also exit once `parent` is
    /// cancelled.
    ///
    /// Cancelling the parent does not stop the pool: Submit keeps accepting
    /// tasks, which nobody runs, until [`stop`](Self::stop) is called.
    pub fn with_parent(
        config: PoolConfig,
        hook: Option<CompletionHook>,
        parent: CancellationToken,
    ) -> Result<Self> {
        Self::spawn(config, hook, Some(parent))
    }

    fn spawn(
        config: PoolConfig,
        hook: Option<CompletionHook>,
        parent: Option<CancellationToken>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| Error::config(errors.join("; ")))?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::config("WorkerPool must be created from within a tokio runtime")
        })?;

        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let cancel = match parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let counters = Arc::new(PoolCounters::default());

        for warning in config.warnings() {
            tracing::warn!("🔨 {}", warning);
        }

        let mut workers = Vec::with_capacity(config.num_workers);
        for worker_id in 0..config.num_workers {
            counters.active_workers.fetch_add(1, Ordering::AcqRel);
            let worker = Worker::new(
                worker_id,
                Arc::clone(&queue),
                cancel.clone(),
                hook.clone(),
                Arc::clone(&counters),
            );
            workers.push(runtime.spawn(worker.run()));
        }

        tracing::info!(
            "🔨 Worker pool started with {} workers and queue size {}",
            config.num_workers,
            config.queue_capacity
        );

        Ok(Self {
            config,
            queue,
            lifecycle: RwLock::new(Lifecycle {
                stopped: false,
                workers,
            }),
            cancel,
            counters,
        })
    }

    /// Start building a pool.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// Submit a future to be run by one of the workers.
    pub fn submit<F>(&self, fut: F) -> PoolResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submit_task(task::task(fut))
    }

    /// Submit a synchronous closure, run on tokio's blocking thread pool.
    pub fn submit_blocking<F>(&self, f: F) -> PoolResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(task::blocking_task(f))
    }

    /// Submit an already boxed task.
    ///
    /// Fails with [`PoolError::Stopped`] once Stop has begun and with
    /// [`PoolError::QueueFull`] when no slot is free. A rejected task is
    /// dropped without running.
    pub fn submit_task(&self, task: Task) -> PoolResult<()> {
        // Stop holds the write lock for its whole run, so failing to get a
        // read guard means a shutdown is in progress.
        let Ok(lifecycle) = self.lifecycle.try_read() else {
            return Err(self.reject(PoolError::Stopped));
        };
        if lifecycle.stopped {
            return Err(self.reject(PoolError::Stopped));
        }

        match self.queue.try_push(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(PushError::Full(_)) => Err(self.reject(PoolError::QueueFull)),
            Err(PushError::Closed(_)) => Err(self.reject(PoolError::Stopped)),
        }
    }

    fn reject(&self, error: PoolError) -> PoolError {
        let counter = match error {
            PoolError::Stopped => &self.counters.rejected_stopped,
            PoolError::QueueFull => &self.counters.rejected_full,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("🔨 Submission rejected: {}", error);
        error
    }

    /// Stop the pool and wait for every worker to exit.
    ///
    /// The first call closes the queue and, under
    /// [`ShutdownPolicy::Cancel`], raises the cancellation signal. Later or
    /// concurrent calls wait for the first one to finish and return without
    /// doing anything.
    ///
    /// Cancel-safe: a worker handle is only forgotten once it has been joined,
    /// so if this future is dropped midway the next call waits for the
    /// workers that are left.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        if !lifecycle.stopped {
            lifecycle.stopped = true;

            tracing::info!(
                "🔨 Stopping worker pool ({:?}, {} tasks queued)",
                self.config.shutdown_policy,
                self.queue.len()
            );

            self.queue.close();
            if self.config.shutdown_policy == ShutdownPolicy::Cancel {
                self.cancel.cancel();
            }
        } else if lifecycle.workers.is_empty() {
            return;
        } else {
            tracing::debug!(
                "🔨 Resuming interrupted stop, {} workers left",
                lifecycle.workers.len()
            );
        }

        let mut drained = 0usize;
        let mut cancelled = 0usize;
        while let Some(handle) = lifecycle.workers.last_mut() {
            let joined = handle.await;
            lifecycle.workers.pop();

            match joined {
                Ok(WorkerExit::Drained) => drained += 1,
                Ok(WorkerExit::Cancelled) => cancelled += 1,
                Err(e) => {
                    tracing::error!(
                        "🔨 Worker {} ended abnormally: {}",
                        lifecycle.workers.len(),
                        e
                    );
                }
            }
        }
        self.cancel.cancel();

        let abandoned = self.queue.clear();
        if abandoned > 0 {
            tracing::warn!("🔨 Dropped {} queued tasks on shutdown", abandoned);
        }

        tracing::info!(
            "🔨 Worker pool stopped: {} drained, {} cancelled",
            drained,
            cancelled
        );
    }

    /// Whether Stop has begun.
    pub fn is_stopped(&self) -> bool {
        match self.lifecycle.try_read() {
            Ok(lifecycle) => lifecycle.stopped,
            Err(_) => true,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.config.num_workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.config.shutdown_policy
    }

    /// Tasks accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active_workers(&self) -> usize {
        self.counters.active_workers.load(Ordering::Acquire)
    }

    /// A token that is cancelled once the pool has shut down or its parent
    /// token was cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.counters
            .snapshot(self.config.num_workers, self.queue.len())
    }

    /// Get the configuration used by this pool.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[async_trait]
impl Pool for WorkerPool {
    fn submit_task(&self, task: Task) -> PoolResult<()> {
        WorkerPool::submit_task(self, task)
    }

    async fn stop(&self) {
        WorkerPool::stop(self).await
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Without this the workers would wait on the queue forever.
        self.queue.close();
        self.cancel.cancel();

        if !self.lifecycle.get_mut().stopped {
            tracing::warn!(
                "🔨 Worker pool dropped without stop(); running tasks finish, queued tasks are dropped"
            );
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Builder for [`WorkerPool`].
#[derive(Default)]
pub struct PoolBuilder {
    config: PoolConfig,
    hook: Option<CompletionHook>,
    parent: Option<CancellationToken>,
}

impl PoolBuilder {
    /// Start from an existing configuration.
    pub fn from_config(config: PoolConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn workers(mut self, num_workers: usize) -> Self {
        self.config.num_workers = num_workers;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.config.queue_capacity = queue_capacity;
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = policy;
        self
    }

    /// Call `hook` after every task a worker finishes.
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hook = Some(task::hook(hook));
        self
    }

    /// Tie the workers to `parent`; see [`WorkerPool::with_parent`].
    pub fn parent_token(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn build(self) -> Result<WorkerPool> {
        WorkerPool::spawn(self.config, self.hook, self.parent)
    }
}
