// ABOUTME: Airbyte sync client module
// ABOUTME: Triggers connection syncs, polls jobs to completion and summarizes record counts

pub mod client;
pub mod models;
pub mod poll;
pub mod summary;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Credentials;

pub use client::AirbyteClient;
pub use models::{Attempt, Job, JobId, JobStatus, StreamStat, StreamStats};
pub use poll::{poll_until_terminal, PollOptions};
pub use summary::{summarize, SyncSummary};

/// The calls the sync orchestration needs from the connector service.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Exchange credentials for a bearer token reused by every later call.
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;

    async fn trigger_sync(&self, connection_id: &str) -> Result<JobId>;

    async fn get_job(&self, job_id: &JobId) -> Result<Job>;
}
