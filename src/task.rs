//! Task and completion hook definitions.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// A unit of work accepted by the pool.
///
/// Tasks take no arguments and produce nothing the pool looks at. Any error
/// is the task's own business and has to be reported through whatever channel
/// the task closes over.
pub type Task = BoxFuture<'static, ()>;

/// Callback invoked by a worker right after one of its tasks finishes.
///
/// It can run on any worker, concurrently with itself, in no particular order
/// across workers.
pub type CompletionHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Box a future into a [`Task`].
pub fn task<F>(fut: F) -> Task
where
    F: Future<Output = ()> + Send + 'static,
{
    fut.boxed()
}

/// Wrap a synchronous closure into a [`Task`].
///
/// The closure runs on tokio's blocking thread pool so a slow body does not
/// stall the runtime thread its worker lives on. A panic in the closure is
/// re-raised inside the task, where the worker catches it like any other.
pub fn blocking_task<F>(f: F) -> Task
where
    F: FnOnce() + Send + 'static,
{
    async move {
        if let Err(join_error) = tokio::task::spawn_blocking(f).await {
            if join_error.is_panic() {
                std::panic::resume_unwind(join_error.into_panic());
            }
        }
    }
    .boxed()
}

/// Build a [`CompletionHook`] from a closure.
pub fn hook<F>(f: F) -> CompletionHook
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_task_runs_future() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        task(async move {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocking_task_runs_closure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        blocking_task(move || {
            c.fetch_add(2, Ordering::SeqCst);
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blocking_task_propagates_panic() {
        let result = AssertUnwindSafe(blocking_task(|| panic!("boom")))
            .catch_unwind()
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_hook_is_callable() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let h = hook(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        h();
        h();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
