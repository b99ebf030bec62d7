//! Job results and the background writer that streams them to disk.

use super::job::{Job, JobType};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the channel between tasks and the writer.
const RESULT_CHANNEL_CAPACITY: usize = 100;

/// Stage a job has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

/// One line of `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    /// A job a worker has just picked up.
    pub fn processing(job: &Job, start_time: DateTime<Utc>) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type,
            status: JobStatus::Processing,
            start_time: Some(start_time),
            end_time: None,
            duration: None,
            error: None,
        }
    }

    /// Mark the job as finished at `end_time`.
    pub fn complete(mut self, end_time: DateTime<Utc>, elapsed: Duration) -> Self {
        self.status = JobStatus::Completed;
        self.end_time = Some(end_time);
        self.duration = Some(format!("{:?}", elapsed));
        self
    }

    /// Extra `completed` record emitted by the per-type completion hook of
    /// a known job type, stamped when the hook fires.
    pub fn type_hook(job: &Job, at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type,
            status: JobStatus::Completed,
            start_time: Some(at),
            end_time: None,
            duration: None,
            error: None,
        }
    }

    /// A job that never ran, for example because the pool rejected it.
    pub fn failed(job: &Job, error: impl ToString) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type,
            status: JobStatus::Failed,
            start_time: None,
            end_time: None,
            duration: None,
            error: Some(error.to_string()),
        }
    }
}

/// Sending half handed to job tasks.
pub type ResultSender = mpsc::Sender<JobResult>;

/// Background task appending pretty-printed results to a file.
pub struct ResultWriter {
    handle: JoinHandle<Result<usize>>,
}

impl ResultWriter {
    /// Create (or truncate) `path` and start the writer.
    pub async fn create(path: impl AsRef<Path>) -> Result<(ResultSender, Self)> {
        let file = File::create(path.as_ref()).await?;
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let handle = tokio::spawn(write_results(file, rx));
        Ok((tx, Self { handle }))
    }

    /// Wait until every sender is gone and the file is flushed. Returns the
    /// number of results written.
    pub async fn finish(self) -> Result<usize> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e).into()),
        }
    }
}

async fn write_results(mut file: File, mut rx: mpsc::Receiver<JobResult>) -> Result<usize> {
    let mut written = 0;

    while let Some(result) = rx.recv().await {
        let mut encoded = match serde_json::to_vec_pretty(&result) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to encode result for job {}: {}", result.job_id, e);
                continue;
            }
        };
        encoded.push(b'\n');

        if let Err(e) = file.write_all(&encoded).await {
            tracing::error!("Failed to write result to file: {}", e);
            continue;
        }
        written += 1;
    }

    file.flush().await?;
    Ok(written)
}

/// Parse a file produced by [`ResultWriter`].
pub fn read_results(path: impl AsRef<Path>) -> Result<Vec<JobResult>> {
    let raw = std::fs::read(path)?;
    let results = serde_json::Deserializer::from_slice(&raw)
        .into_iter::<JobResult>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_json_format() {
        let job = Job::new(4, JobType::Second);
        let failed = JobResult::failed(&job, "worker pool's queue is full");

        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["job_id"], 4);
        assert_eq!(value["job_type"], 2);
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "worker pool's queue is full");

        let started = Utc::now();
        let done = JobResult::processing(&job, started).complete(started, Duration::from_millis(5));
        let value = serde_json::to_value(&done).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["duration"], "5ms");
        assert!(value.get("error").is_none());
    }

    #[tokio::test]
    async fn test_writer_streams_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let (tx, writer) = ResultWriter::create(&path).await.unwrap();
        let job = Job::new(1, JobType::First);
        tx.send(JobResult::processing(&job, Utc::now())).await.unwrap();
        tx.send(JobResult::failed(&job, "boom")).await.unwrap();
        drop(tx);

        assert_eq!(writer.finish().await.unwrap(), 2);

        let results = read_results(&path).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, JobStatus::Processing);
        assert_eq!(results[1].error.as_deref(), Some("boom"));
    }
}
