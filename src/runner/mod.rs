//! Job runner built on top of [`WorkerPool`].
//!
//! The runner reads job definitions (or generates a default workload), turns
//! each one into a pool task, and streams a JSON record per job stage to
//! `results.json`. It only talks to the pool through submit, stop and the
//! completion hook.

use crate::config::{LoggingConfig, RunnerConfig};
use crate::core::WorkerPool;
use crate::error::Result;
use chrono::Utc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

pub mod job;
pub mod results;

pub use job::{Job, JobType, generate_default_jobs, load_jobs, process_job};
pub use results::{JobResult, JobStatus, ResultSender, ResultWriter, read_results};

/// Number of jobs generated when `jobs.json` cannot be used.
pub const DEFAULT_JOB_COUNT: usize = 15;

/// Outcome of a [`JobRunner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Jobs accepted by the pool
    pub submitted: usize,
    /// Jobs the pool rejected
    pub rejected: usize,
    /// Records written to the results file
    pub results_written: usize,
    /// Whether the pool stopped within the configured timeout
    pub stopped_in_time: bool,
    /// Whether a shutdown request cut the submission loop short
    pub interrupted: bool,
}

/// Install a `tracing` subscriber for the binary.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false` if
/// a global subscriber was already set.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let level: tracing::Level = config.level.into();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_targets)
        .with_ansi(config.colored)
        .try_init()
        .is_ok()
}

/// Wrap `job` into a pool task reporting to `results`.
///
/// A job emits a `processing` record when it starts and a `completed` record
/// when it ends. Known job types also fire their type hook in between, which
/// emits one more `completed` record.
pub fn job_task(job: Job, results: ResultSender) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let start_time = Utc::now();
        let started = Instant::now();
        let record = JobResult::processing(&job, start_time);
        report(&results, record.clone()).await;

        process_job(&job).await;

        match job.job_type {
            JobType::First | JobType::Second => {
                report(&results, JobResult::type_hook(&job, Utc::now())).await;
            }
            JobType::Other(code) => tracing::warn!("Unknown job type: {}", code),
        }

        let record = record.complete(Utc::now(), started.elapsed());
        report(&results, record).await;
    }
}

async fn report(results: &ResultSender, record: JobResult) {
    let job_id = record.job_id;
    if let Err(e) = results.send(record).await {
        tracing::warn!("Failed to send result for job {}: {}", job_id, e);
    }
}

/// Drives one run: load jobs, submit them, stop the pool, flush results.
pub struct JobRunner {
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Jobs from `jobs.json`, or a generated default set if it cannot be read.
    pub fn jobs(&self) -> Vec<Job> {
        let path = self.config.jobs_file();
        match load_jobs(&path) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::warn!(
                    "Failed to read jobs from {}, using default jobs: {}",
                    path.display(),
                    e
                );
                generate_default_jobs(DEFAULT_JOB_COUNT)
            }
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_until(CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but stop submitting as soon as `shutdown` is
    /// cancelled. Jobs already accepted are still stopped and flushed the
    /// normal way.
    pub async fn run_until(&self, shutdown: CancellationToken) -> Result<RunSummary> {
        tokio::fs::create_dir_all(&self.config.path).await?;
        let results_path = self.config.results_file();
        let (results, writer) = ResultWriter::create(&results_path).await?;

        let pool_config = self.config.pool_config();
        tracing::info!(
            "Starting worker pool with {} workers and queue size {}",
            pool_config.num_workers,
            pool_config.queue_capacity
        );
        let pool = WorkerPool::builder()
            .workers(pool_config.num_workers)
            .queue_capacity(pool_config.queue_capacity)
            .shutdown_policy(pool_config.shutdown_policy)
            .on_complete(|| tracing::info!("Task completed"))
            .build()?;

        let mut summary = RunSummary::default();
        let submit_interval = self.config.submit_interval();

        for job in self.jobs() {
            if shutdown.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            match pool.submit(job_task(job, results.clone())) {
                Ok(()) => {
                    summary.submitted += 1;
                    tracing::info!(
                        "Submitted job {} (Type: {})",
                        job.job_id,
                        i64::from(job.job_type)
                    );
                }
                Err(e) => {
                    summary.rejected += 1;
                    tracing::warn!("Failed to submit job {}: {}", job.job_id, e);
                    report(&results, JobResult::failed(&job, e)).await;
                }
            }

            if !submit_interval.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        summary.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(submit_interval) => {}
                }
            }
        }

        if summary.interrupted {
            tracing::info!(
                "Shutdown requested after {} submissions, stopping worker pool",
                summary.submitted
            );
        } else {
            tracing::info!("All jobs submitted. Waiting for completion...");
        }
        summary.stopped_in_time = tokio::time::timeout(self.config.timeout(), pool.stop())
            .await
            .is_ok();
        if !summary.stopped_in_time {
            tracing::warn!(
                "Worker pool did not stop within {:?}, abandoning remaining jobs",
                self.config.timeout()
            );
        }

        // Abandoned tasks still hold senders; dropping the pool releases them.
        drop(pool);
        drop(results);
        summary.results_written = writer.finish().await?;

        tracing::info!(
            "Application finished. Results saved to {}",
            results_path.display()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShutdownPolicy;

    fn runner_config(dir: &std::path::Path, raw_pool: &str) -> RunnerConfig {
        let raw = format!(
            r#"{{ "workerPool": {}, "path": "{}", "submitIntervalMs": 0, "timeout": 10 }}"#,
            raw_pool,
            dir.display()
        );
        RunnerConfig::from_json_str(&raw).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_jobs_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("jobs.json"),
            r#"[{"job_id": 1, "job_type": 2}, {"job_id": 2, "job_type": 2}]"#,
        )
        .unwrap();

        let config = runner_config(dir.path(), r#"{ "queueSize": 10, "numberOfWorkers": 2 }"#);
        let summary = JobRunner::new(config.clone()).run().await.unwrap();

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.rejected, 0);
        assert!(summary.stopped_in_time);
        assert!(!summary.interrupted);
        assert_eq!(summary.results_written, 6);

        let results = read_results(config.results_file()).unwrap();
        let completed = results
            .iter()
            .filter(|r| r.status == JobStatus::Completed)
            .count();
        assert_eq!(completed, 4);
        assert_eq!(
            results.iter().filter(|r| r.duration.is_some()).count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_rejections() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("jobs.json"),
            r#"[{"job_id": 1, "job_type": 2}, {"job_id": 2, "job_type": 2}, {"job_id": 3, "job_type": 2}]"#,
        )
        .unwrap();

        let config = runner_config(dir.path(), r#"{ "queueSize": 1, "numberOfWorkers": 1 }"#);
        let summary = JobRunner::new(config.clone()).run().await.unwrap();

        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.results_written, 5);

        let results = read_results(config.results_file()).unwrap();
        let failed: Vec<_> = results
            .iter()
            .filter(|r| r.status == JobStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|r| r.error.as_deref() == Some("worker pool's queue is full")));
    }

    #[tokio::test]
    async fn test_jobs_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = runner_config(dir.path(), "{}");
        assert_eq!(config.shutdown_policy, ShutdownPolicy::Drain);

        let jobs = JobRunner::new(config).jobs();
        assert_eq!(jobs.len(), DEFAULT_JOB_COUNT);
    }
    fn write_jobs(dir: &std::path::Path, raw: &str) {
        std::fs::write(dir.join("jobs.json"), raw).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_stop_timeout() {
        let dir = tempfile::tempdir().unwrap();
        // 800 + 100 * 50 ms of processing, well past the one second timeout
        write_jobs(dir.path(), r#"[{"job_id": 100, "job_type": 1}]"#);

        let raw = format!(
            r#"{{ "workerPool": {{ "queueSize": 2, "numberOfWorkers": 1 }}, "path": "{}", "submitIntervalMs": 0, "timeout": 1 }}"#,
            dir.path().display()
        );
        let config = RunnerConfig::from_json_str(&raw).unwrap();
        let summary = JobRunner::new(config.clone()).run().await.unwrap();

        assert_eq!(summary.submitted, 1);
        assert!(!summary.stopped_in_time);
        assert_eq!(summary.results_written, 3);

        let results = read_results(config.results_file()).unwrap();
        assert_eq!(results.last().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_submitting_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        write_jobs(
            dir.path(),
            r#"[{"job_id": 1, "job_type": 2}, {"job_id": 2, "job_type": 2}, {"job_id": 3, "job_type": 2}]"#,
        );

        let raw = format!(
            r#"{{ "workerPool": {{ "queueSize": 10, "numberOfWorkers": 2 }}, "path": "{}", "submitIntervalMs": 50 }}"#,
            dir.path().display()
        );
        let config = RunnerConfig::from_json_str(&raw).unwrap();

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(60)).await;
            trigger.cancel();
        });

        let summary = JobRunner::new(config.clone())
            .run_until(shutdown)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.submitted, 2);
        assert!(summary.stopped_in_time);
        assert_eq!(summary.results_written, 6);
        assert_eq!(read_results(config.results_file()).unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_run_until_already_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let config = runner_config(dir.path(), "{}");

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let summary = JobRunner::new(config.clone())
            .run_until(shutdown)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.results_written, 0);
        assert!(config.results_file().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_task_survives_closed_writer() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        drop(rx);

        job_task(Job::new(1, JobType::Other(9)), tx).await;
    }
}
