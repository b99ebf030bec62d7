//! Fixed-capacity FIFO backed by a mutex-guarded deque.
//!
//! Capacity is counted in slots. A slot is taken when an item is accepted and
//! comes back when the [`Slot`] returned alongside the popped item is dropped,
//! so a consumer decides how long an item keeps occupying the queue.

use super::PushError;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// One unit of queue capacity, released on drop.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

struct QueueState<T> {
    items: VecDeque<(T, Slot)>,
    closed: bool,
}

/// Fixed-capacity, multi-producer multi-consumer FIFO.
pub struct BoundedQueue<T> {
    capacity: usize,
    slots: Arc<Semaphore>,
    state: Mutex<QueueState<T>>,
    available: Notify,
}

impl<T> BoundedQueue<T> {
    /// Create a queue with `capacity` slots.
    ///
    /// A zero-capacity queue is valid and rejects every push.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`](super::MAX_CAPACITY).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item` without waiting.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }

        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(PushError::Full(item)),
        };

        state.items.push_back((item, Slot { _permit: permit }));
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest item, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and empty. Dropping the future
    /// before it completes loses nothing.
    pub async fn pop(&self) -> Option<(T, Slot)> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before looking at the state so a push or close racing
            // with the check still wakes us.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(entry) = state.items.pop_front() {
                    return Some(entry);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop accepting items. Queued items can still be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Drop every queued item, returning how many there were.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.lock().items.drain(..).collect();
        drained.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items waiting to be popped.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Slots not held by a queued or popped-but-unreleased item.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let queue = BoundedQueue::new(3);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        queue.try_push(3).unwrap();
        assert_eq!(queue.len(), 3);

        let (first, _slot) = queue.pop().await.unwrap();
        let (second, _slot) = queue.pop().await.unwrap();
        let (third, _slot) = queue.pop().await.unwrap();
        assert_eq!((first, second, third), (1, 2, 3));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_hands_item_back() {
        let queue = BoundedQueue::new(1);
        queue.try_push("a").unwrap();

        let err = queue.try_push("b").unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), "b");
    }

    #[tokio::test]
    async fn test_slot_held_until_dropped() {
        let queue = BoundedQueue::new(1);
        queue.try_push(1).unwrap();

        let (item, slot) = queue.pop().await.unwrap();
        assert_eq!(item, 1);
        assert_eq!(queue.available_slots(), 0);
        assert!(queue.try_push(2).unwrap_err().is_full());

        drop(slot);
        assert_eq!(queue.available_slots(), 1);
        assert!(queue.try_push(2).is_ok());
    }

    #[tokio::test]
    async fn test_zero_capacity_rejects_everything() {
        let queue = BoundedQueue::new(0);
        assert!(queue.try_push(()).unwrap_err().is_full());
        assert_eq!(queue.capacity(), 0);
    }

    #[tokio::test]
    async fn test_closed_queue_drains_then_ends() {
        let queue = BoundedQueue::new(2);
        queue.try_push(7).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(queue.try_push(8).unwrap_err().is_closed());

        let (item, _slot) = queue.pop().await.unwrap();
        assert_eq!(item, 7);
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = Arc::new(BoundedQueue::<u32>::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await.map(|(item, _)| item) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let popped = timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake on close")
            .unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_push_wakes_waiting_consumer() {
        let queue = Arc::new(BoundedQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await.map(|(item, _)| item) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.try_push(42).unwrap();

        let popped = timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake on push")
            .unwrap();
        assert_eq!(popped, Some(42));
    }

    #[tokio::test]
    async fn test_clear_releases_slots() {
        let queue = BoundedQueue::new(2);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_many_consumers_each_item_once() {
        let queue = Arc::new(BoundedQueue::new(64));
        for i in 0..64 {
            queue.try_push(i).unwrap();
        }
        queue.close();

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some((item, _slot)) = queue.pop().await {
                    seen.push(item);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..64).collect::<Vec<_>>());
    }
}
