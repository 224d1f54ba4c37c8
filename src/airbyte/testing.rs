// ABOUTME: Scripted SyncApi used by unit tests
// ABOUTME: Replays a fixed sequence of job reads without any network access

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::models::{Job, JobId, JobStatus};
use super::SyncApi;
use crate::config::Credentials;
use crate::error::PipelineError;

pub(crate) enum Step {
    Status(JobStatus),
    Job(Job),
    ReadError,
}

pub(crate) struct ScriptedApi {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<JobStatus>,
    reads: AtomicUsize,
    pub(crate) reject_auth: Option<u16>,
    pub(crate) job_id: Option<JobId>,
    pub(crate) token: Option<String>,
}

impl ScriptedApi {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: None,
            reads: AtomicUsize::new(0),
            reject_auth: None,
            job_id: Some(JobId::from("42")),
            token: None,
        }
    }

    pub(crate) fn repeating(status: JobStatus) -> Self {
        Self {
            fallback: Some(status),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncApi for ScriptedApi {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        if let Some(status) = self.reject_auth {
            return Err(PipelineError::Authentication {
                status,
                body: "bad credentials".to_string(),
            }
            .into());
        }
        self.token = Some(format!("token-for-{}", credentials.client_id));
        Ok(())
    }

    async fn trigger_sync(&self, _connection_id: &str) -> Result<JobId> {
        assert!(self.token.is_some(), "trigger before authenticate");
        self.job_id
            .clone()
            .ok_or_else(|| PipelineError::MissingJobId("{\"job\":{}}".to_string()).into())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Job> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        let step = match (step, self.fallback) {
            (Some(step), _) => step,
            (None, Some(status)) => Step::Status(status),
            (None, None) => panic!("job read script exhausted"),
        };

        match step {
            Step::Status(status) => Ok(Job {
                id: Some(job_id.clone()),
                status,
                ..Default::default()
            }),
            Step::Job(job) => Ok(job),
            Step::ReadError => {
                Err(PipelineError::PollRead(format!("job {}: connection reset", job_id)).into())
            }
        }
    }
}
