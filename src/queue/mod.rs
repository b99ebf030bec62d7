//! Queue used to hand tasks from submitters to workers.
//!
//! Producers never wait: [`BoundedQueue::try_push`] either takes the item or
//! hands it straight back as a [`PushError`]. Consumers wait in
//! [`BoundedQueue::pop`] until an item shows up or the queue is closed and
//! drained.
//!
//! # Examples
//!
//! ```rust
//! use smithypool::queue::BoundedQueue;
//!
//! let queue = BoundedQueue::new(1);
//! assert!(queue.try_push("first").is_ok());
//! assert!(queue.try_push("second").unwrap_err().is_full());
//! ```

use std::fmt;
use tokio::sync::Semaphore;

pub mod bounded;
pub use bounded::{BoundedQueue, Slot};

/// Largest capacity a queue can be created with.
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

/// Why [`BoundedQueue::try_push`] refused an item. The item is handed back.
pub enum PushError<T> {
    /// Every slot is taken
    Full(T),
    /// The queue was closed
    Closed(T),
}

impl<T> PushError<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}
