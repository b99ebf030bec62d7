//! Error types for smithypool operations.

use thiserror::Error;

/// Result type returned by [`WorkerPool::submit`](crate::WorkerPool::submit).
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Result type used throughout the rest of smithypool.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a submission can be rejected.
///
/// Both are returned synchronously to the submitter; the pool never logs them
/// as failures and never retries on the caller's behalf.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Stop has begun or completed. The pool will never accept work again.
    #[error("worker pool is stopped")]
    Stopped,

    /// Every queue slot is taken. The task was dropped; the caller may retry
    /// later or give up.
    #[error("worker pool's queue is full")]
    QueueFull,
}

impl PoolError {
    /// Whether retrying the same submission later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull)
    }
}

/// Crate-level error for construction, configuration and the job runner.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A submission was rejected
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
