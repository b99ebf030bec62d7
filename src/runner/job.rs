//! Job definitions consumed by the runner.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Kind of work a job performs, encoded as an integer on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum JobType {
    First,
    Second,
    /// Any other code; processed with a fixed fallback duration
    Other(i64),
}

impl From<i64> for JobType {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::First,
            2 => Self::Second,
            other => Self::Other(other),
        }
    }
}

impl From<JobType> for i64 {
    fn from(job_type: JobType) -> Self {
        match job_type {
            JobType::First => 1,
            JobType::Second => 2,
            JobType::Other(code) => code,
        }
    }
}

/// A job read from `jobs.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: i64,
    pub job_type: JobType,
}

impl Job {
    pub fn new(job_id: i64, job_type: JobType) -> Self {
        Self { job_id, job_type }
    }

    /// How long processing this job takes.
    pub fn processing_time(&self) -> Duration {
        match self.job_type {
            JobType::First => Duration::from_millis((800 + self.job_id * 50).max(0) as u64),
            JobType::Second => Duration::from_millis(500),
            JobType::Other(_) => Duration::from_secs(1),
        }
    }
}

/// Read a JSON array of jobs.
pub fn load_jobs(path: impl AsRef<Path>) -> Result<Vec<Job>> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Generate `count` jobs numbered from 1, alternating type 1 (odd ids) and
/// type 2 (even ids).
pub fn generate_default_jobs(count: usize) -> Vec<Job> {
    (1..=count as i64)
        .map(|job_id| {
            let job_type = if job_id % 2 == 0 {
                JobType::Second
            } else {
                JobType::First
            };
            Job::new(job_id, job_type)
        })
        .collect()
}

/// Simulate the work of `job`, returning how long it took.
pub async fn process_job(job: &Job) -> Duration {
    tracing::info!(
        "Processing job {} (Type: {})...",
        job.job_id,
        i64::from(job.job_type)
    );

    let processing_time = job.processing_time();
    tokio::time::sleep(processing_time).await;

    tracing::info!("Finished job {} (took {:?})", job.job_id, processing_time);
    processing_time
}
