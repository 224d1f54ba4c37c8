// ABOUTME: HTTP client for communicating with the Airbyte configuration API
// ABOUTME: Handles token exchange, sync triggering, job reads and job listings

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;

use super::models::{
    DebugInfo, Job, JobEnvelope, JobId, JobIdRequest, JobListRequest, JobListResponse,
    Pagination, SyncRequest, TokenRequest, TokenResponse,
};
use super::SyncApi;
use crate::config::{AirbyteConfig, Credentials};
use crate::error::PipelineError;

const TOKEN_PATH: &str = "/api/v1/applications/token";
const SYNC_PATH: &str = "/api/v1/connections/sync";
const JOB_GET_PATH: &str = "/api/v1/jobs/get";
const JOB_LIST_PATH: &str = "/api/v1/jobs/list";
const JOB_DEBUG_PATH: &str = "/api/v1/jobs/get_debug_info";

pub const DEFAULT_JOB_PAGE_SIZE: u32 = 10;

pub struct AirbyteClient {
    client: Client,
    api_base_url: String,
    token: Option<String>,
}

impl AirbyteClient {
    pub fn new(api_base_url: String, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn from_config(config: &AirbyteConfig) -> Result<Self> {
        Self::new(config.base_url()?, config.request_timeout())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let token = self.token.as_deref().ok_or_else(|| {
            PipelineError::Config(format!(
                "request to {} attempted before authenticating",
                path
            ))
        })?;

        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        Ok(response)
    }

    /// Recent sync jobs for a connection, most recent first.
    pub async fn list_jobs(&self, connection_id: &str, page_size: u32) -> Result<Vec<Job>> {
        let request = JobListRequest {
            config_types: vec!["sync"],
            config_id: connection_id,
            pagination: Pagination { page_size },
        };

        let response = self
            .post(JOB_LIST_PATH, &request)
            .await
            .context("Failed to list jobs. The Airbyte server may be unavailable")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to list jobs {}: {}", status, body);
        }

        let listing: JobListResponse = response
            .json()
            .await
            .context("Failed to parse job listing")?;

        Ok(listing.jobs.into_iter().map(|entry| entry.job).collect())
    }

    pub async fn get_debug_info(&self, job_id: &JobId) -> Result<DebugInfo> {
        let response = self
            .post(JOB_DEBUG_PATH, &JobIdRequest { id: job_id })
            .await
            .with_context(|| format!("Failed to fetch debug info for job {}", job_id))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to get debug info for job {}: {}: {}", job_id, status, body);
        }

        let info: DebugInfo = response
            .json()
            .await
            .context("Failed to parse job debug info")?;

        Ok(info)
    }
}

#[async_trait]
impl SyncApi for AirbyteClient {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let request = TokenRequest {
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
        };

        let response = self
            .client
            .post(self.endpoint(TOKEN_PATH))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to reach the Airbyte token endpoint")?;

        if response.status() != reqwest::StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Authentication { status, body }.into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        tracing::debug!("Obtained Airbyte access token");
        self.token = Some(token.access_token);
        Ok(())
    }

    async fn trigger_sync(&self, connection_id: &str) -> Result<JobId> {
        let response = self
            .post(SYNC_PATH, &SyncRequest { connection_id })
            .await
            .map_err(|e| PipelineError::SyncTrigger(format!("{:#}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PipelineError::SyncTrigger(format!(
                "connection {} returned {}: {}",
                connection_id, status, body
            ))
            .into());
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|_| PipelineError::MissingJobId(body.clone()))?;

        match &value["job"]["id"] {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(id) => Ok(JobId::from(id)),
                None => Err(PipelineError::MissingJobId(body).into()),
            },
            serde_json::Value::String(s) if !s.is_empty() => Ok(JobId::from(s.as_str())),
            _ => Err(PipelineError::MissingJobId(body).into()),
        }
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Job> {
        let response = self
            .post(JOB_GET_PATH, &JobIdRequest { id: job_id })
            .await
            .map_err(|e| PipelineError::PollRead(format!("job {}: {:#}", job_id, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::PollRead(format!(
                "job {} returned {}: {}",
                job_id, status, body
            ))
            .into());
        }

        let envelope: JobEnvelope = response.json().await.map_err(|e| {
            PipelineError::PollRead(format!("job {}: undecodable body: {}", job_id, e))
        })?;

        Ok(envelope.job)
    }
}
