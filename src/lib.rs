//! # smithypool
//!
//! A bounded, fixed-size async worker pool for Rust applications.
//!
//! ## Features
//!
//! - **Fixed worker count**: workers are spawned once, at construction
//! - **Backpressure**: submissions never wait; a full queue rejects them
//! - **Graceful shutdown**: `stop()` is idempotent and waits for every worker
//! - **Completion hook**: an optional callback after every finished task
//! - **Observability**: `tracing` logs and a `PoolStats` snapshot
//!
//! ## Quick Start
//!
//! ```rust
//! use smithypool::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> smithypool::Result<()> {
//!     let pool = WorkerPool::new(PoolConfig::with_workers(4).with_queue_capacity(64), None)?;
//!
//!     for i in 0..10 {
//!         match pool.submit(async move { tracing::info!("task {} running", i) }) {
//!             Ok(()) => {}
//!             Err(PoolError::QueueFull) => tracing::warn!("task {} dropped", i),
//!             Err(PoolError::Stopped) => break,
//!         }
//!     }
//!
//!     pool.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod queue;
pub mod runner;
pub mod task;

pub mod prelude {
    pub use crate::config::{PoolConfig, ShutdownPolicy};
    pub use crate::core::{Pool, PoolBuilder, PoolStats, WorkerPool};
    pub use crate::error::{Error, PoolError, PoolResult, Result};
    pub use crate::task::{CompletionHook, Task};
}

pub use crate::config::{PoolConfig, ShutdownPolicy};
pub use crate::core::{Pool, PoolBuilder, PoolStats, WorkerExit, WorkerPool};
pub use crate::error::{Error, PoolError, PoolResult, Result};
pub use crate::queue::{BoundedQueue, PushError};
pub use crate::task::{CompletionHook, Task};
