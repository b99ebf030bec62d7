//! Configuration types for smithypool.
//!
//! [`PoolConfig`] sizes a [`WorkerPool`](crate::WorkerPool). [`RunnerConfig`]
//! is what the job runner binary reads from disk; it wraps a pool section
//! together with logging and file settings.

use crate::error::{Error, Result};
use crate::queue::MAX_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default queue capacity used by the runner when none is configured.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Default worker count used by the runner when none is configured.
pub const DEFAULT_NUMBER_OF_WORKERS: usize = 10;

/// Default runner timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable holding the runner configuration path.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// What Stop does with tasks still sitting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Close the queue and let workers run every queued task before exiting.
    #[default]
    Drain,
    /// Signal cancellation: running tasks finish, queued tasks are dropped.
    Cancel,
}

/// Worker pool configuration.
///
/// # Examples
///
/// ```rust
/// use smithypool::config::{PoolConfig, ShutdownPolicy};
///
/// let config = PoolConfig::with_workers(4)
///     .with_queue_capacity(128)
///     .with_shutdown_policy(ShutdownPolicy::Cancel);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of workers to spawn
    pub num_workers: usize,

    /// Maximum number of accepted tasks that have not finished running.
    /// This also caps how many tasks run at once.
    pub queue_capacity: usize,

    /// Behaviour of Stop towards queued tasks
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let num_workers = num_cpus::get().max(1);
        Self {
            num_workers,
            queue_capacity: num_workers * 16,
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }
}

impl PoolConfig {
    /// Create a pool configuration with a specific number of workers.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the shutdown policy.
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.num_workers == 0 {
            errors.push("Number of workers must be greater than 0".to_string());
        }

        if self.num_workers > 10_000 {
            errors.push("Number of workers should not exceed 10000".to_string());
        }

        if self.queue_capacity > MAX_CAPACITY {
            errors.push(format!(
                "Queue capacity must not exceed {}",
                MAX_CAPACITY
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Settings that are valid but probably not what the caller wants.
    ///
    /// A task keeps its queue slot until it finishes, so no more than
    /// `queue_capacity` tasks run at once; workers beyond that stay idle.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.queue_capacity == 0 {
            warnings.push("Queue capacity is 0, every submission will be rejected".to_string());
        } else if self.queue_capacity < self.num_workers {
            warnings.push(format!(
                "Queue capacity {} is below the worker count {}, at most {} tasks run at once",
                self.queue_capacity, self.num_workers, self.queue_capacity
            ));
        }

        warnings
    }
}

/// Pool section of the runner configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolSection {
    /// Queue capacity; zero or negative selects the default
    #[serde(default)]
    pub queue_size: i64,

    /// Worker count; zero or negative selects the default
    #[serde(default)]
    pub number_of_workers: i64,
}

/// Configuration of the job runner binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Pool sizing
    #[serde(default)]
    pub worker_pool: WorkerPoolSection,

    /// Upper bound on the final shutdown, in seconds; zero or negative selects
    /// the default
    #[serde(default)]
    pub timeout: i64,

    /// Directory holding `jobs.json` and receiving `results.json`
    #[serde(default)]
    pub path: PathBuf,

    /// Behaviour of the final shutdown towards queued jobs
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,

    /// Pause between two submissions, in milliseconds
    #[serde(default = "default_submit_interval_ms")]
    pub submit_interval_ms: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_submit_interval_ms() -> u64 {
    50
}

impl RunnerConfig {
    /// Load the configuration named by the `CONFIG_PATH` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::from_json_file(Self::path_from_env()?)
    }

    /// The configuration path named by the `CONFIG_PATH` environment variable.
    pub fn path_from_env() -> Result<PathBuf> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(Error::config(format!("{} is not set", CONFIG_PATH_ENV))),
        }
    }

    /// Load, normalize and check a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_json_file(path)?.finalize()
    }

    /// Parse a JSON configuration, filling in defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: RunnerConfig = serde_json::from_str(raw)?;
        config.finalize()
    }

    /// Parse a JSON configuration file as written, without defaults or checks.
    ///
    /// Useful when logging has to be set up from the file before
    /// [`finalize`](Self::finalize) reports which defaults it applied.
    pub fn read_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::config(format!(
                "config file does not exist: {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply defaults and check the result.
    pub fn finalize(mut self) -> Result<Self> {
        self.apply_defaults();

        if self.path.as_os_str().is_empty() {
            return Err(Error::config("No path in configs"));
        }

        self.pool_config()
            .validate()
            .map_err(|errors| Error::config(errors.join("; ")))?;

        Ok(self)
    }

    /// Replace non-positive sizes and timeouts with their defaults.
    pub fn apply_defaults(&mut self) {
        if self.worker_pool.queue_size <= 0 {
            self.worker_pool.queue_size = DEFAULT_QUEUE_SIZE as i64;
            tracing::info!("Using default QueueSize: {}", DEFAULT_QUEUE_SIZE);
        }
        if self.worker_pool.number_of_workers <= 0 {
            self.worker_pool.number_of_workers = DEFAULT_NUMBER_OF_WORKERS as i64;
            tracing::info!(
                "Using default NumberOfWorkers: {}",
                DEFAULT_NUMBER_OF_WORKERS
            );
        }
        if self.timeout <= 0 {
            self.timeout = DEFAULT_TIMEOUT_SECS as i64;
            tracing::info!("Using default Timeout: {}", DEFAULT_TIMEOUT_SECS);
        }
    }

    /// The pool configuration described by this file.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            num_workers: self.worker_pool.number_of_workers.max(0) as usize,
            queue_capacity: self.worker_pool.queue_size.max(0) as usize,
            shutdown_policy: self.shutdown_policy,
        }
    }

    pub fn submit_interval(&self) -> Duration {
        Duration::from_millis(self.submit_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(0) as u64)
    }

    pub fn jobs_file(&self) -> PathBuf {
        self.path.join("jobs.json")
    }

    pub fn results_file(&self) -> PathBuf {
        self.path.join("results.json")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: LogLevel,

    /// Enable colored output
    pub colored: bool,

    /// Include target module in logs
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            colored: true,
            include_targets: false,
        }
    }
}

/// Log level enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl PoolConfig {
    /// A small pool for local development.
    pub fn development() -> Self {
        Self {
            num_workers: 2,
            queue_capacity: 32,
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }

    /// One worker per core times two, with a deep queue.
    pub fn production() -> Self {
        let num_workers = num_cpus::get().max(1) * 2;
        Self {
            num_workers,
            queue_capacity: num_workers * 64,
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }

    /// A single worker, for deterministic ordering in tests.
    pub fn testing() -> Self {
        Self {
            num_workers: 1,
            queue_capacity: 10,
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }
}
