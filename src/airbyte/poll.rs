// ABOUTME: Job status polling loop
// ABOUTME: Reads job status at a fixed interval until the job reaches a terminal state

use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;

use super::models::{Job, JobId};
use super::SyncApi;
use crate::error::PipelineError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Sleep between two successful non-terminal reads.
    pub interval: Duration,
    /// Sleep after a failed read before trying again.
    pub retry_delay: Duration,
    /// Wall-clock limit for the whole loop. `None` polls until terminal.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: None,
        }
    }
}

/// Poll `job_id` until it succeeds, fails or is cancelled, and return the
/// final snapshot. Read failures are logged and retried. `callback` sees
/// every successful read.
pub async fn poll_until_terminal<A: SyncApi + ?Sized>(
    api: &A,
    job_id: &JobId,
    options: &PollOptions,
    callback: impl FnMut(&Job),
) -> Result<Job> {
    let started = Instant::now();
    let polling = poll_loop(api, job_id, options, callback);

    match options.timeout {
        None => Ok(polling.await),
        Some(limit) => match tokio::time::timeout(limit, polling).await {
            Ok(job) => Ok(job),
            Err(_) => Err(PipelineError::PollTimeout {
                job_id: job_id.clone(),
                elapsed: started.elapsed(),
            }
            .into()),
        },
    }
}

async fn poll_loop<A: SyncApi + ?Sized>(
    api: &A,
    job_id: &JobId,
    options: &PollOptions,
    mut callback: impl FnMut(&Job),
) -> Job {
    loop {
        match api.get_job(job_id).await {
            Ok(job) => {
                callback(&job);
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(options.interval).await;
            }
            Err(e) => {
                tracing::warn!("Error polling job {} status: {:#}", job_id, e);
                tokio::time::sleep(options.retry_delay).await;
            }
        }
    }
}
