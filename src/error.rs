// ABOUTME: Custom error types for the weather pipeline
// ABOUTME: One variant per failure class of a sync run, carrying job id and status where known

use std::fmt;
use std::time::Duration;

use crate::airbyte::models::{JobId, JobStatus};

#[derive(Debug)]
pub enum PipelineError {
    /// Token endpoint answered with something other than 200.
    Authentication { status: u16, body: String },
    SyncTrigger(String),
    MissingJobId(String),
    /// A single status read failed. Retried by the poll loop, never surfaced by it.
    PollRead(String),
    TerminalFailure { job_id: JobId, status: JobStatus },
    PollTimeout { job_id: JobId, elapsed: Duration },
    Config(String),
    Manifest(String),
    Transform(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::Authentication { status, body } => write!(
                f,
                "Authentication error: token request failed with status {}: {}",
                status, body
            ),
            PipelineError::SyncTrigger(msg) => write!(f, "Sync trigger error: {}", msg),
            PipelineError::MissingJobId(body) => {
                write!(f, "Sync trigger response has no job id: {}", body)
            }
            PipelineError::PollRead(msg) => write!(f, "Poll read error: {}", msg),
            PipelineError::TerminalFailure { job_id, status } => {
                write!(f, "Airbyte job {} failed with status: {}", job_id, status)
            }
            PipelineError::PollTimeout { job_id, elapsed } => write!(
                f,
                "Airbyte job {} did not finish within {}s; its outcome is unknown",
                job_id,
                elapsed.as_secs()
            ),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Manifest(msg) => write!(f, "Manifest error: {}", msg),
            PipelineError::Transform(msg) => write!(f, "Transform error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}
