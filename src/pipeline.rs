// ABOUTME: Top-level orchestration of a pipeline run
// ABOUTME: authenticate, trigger, poll, summarize, then optionally build dbt models

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::airbyte::models::{Job, JobId, JobStatus};
use crate::airbyte::{poll_until_terminal, summarize, AirbyteClient, PollOptions, SyncApi, SyncSummary};
use crate::config::{AirbyteConfig, PipelineConfig};
use crate::dbt::DbtRunner;
use crate::error::PipelineError;
use crate::progress::{status_line, JobProgress};

/// Outcome of a successful sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub duration: Duration,
    pub attempts: usize,
    pub summary: SyncSummary,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Job ID: {}", self.job_id)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Duration: {}s", self.duration.as_secs())?;
        writeln!(f, "Attempts: {}", self.attempts)?;
        writeln!(f, "Started: {}", format_timestamp(self.started_at))?;
        writeln!(f, "Ended: {}", format_timestamp(self.ended_at))?;
        write!(f, "{}", self.summary)
    }
}

/// Render an epoch-millisecond timestamp in local time, or `N/A`.
pub fn format_timestamp(timestamp_ms: Option<i64>) -> String {
    timestamp_ms
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "N/A".to_string())
}

/// Trigger a sync for the configured connection and wait for it to finish.
///
/// Fails with `TerminalFailure` when the job ends failed or cancelled, and
/// with `PollTimeout` when `poll.timeout` elapses first.
pub async fn run_sync<A: SyncApi + ?Sized>(
    api: &mut A,
    config: &AirbyteConfig,
    poll: &PollOptions,
    mut on_update: impl FnMut(&Job),
) -> Result<SyncReport> {
    let credentials = config.credentials()?;
    let connection_id = config.connection_id()?;

    api.authenticate(&credentials).await?;

    tracing::info!("Triggering sync for Airbyte connection: {}", connection_id);
    let job_id = api.trigger_sync(connection_id).await?;
    tracing::info!("Started Airbyte sync job with ID: {}", job_id);

    let started = Instant::now();
    let job = poll_until_terminal(&*api, &job_id, poll, |job| {
        tracing::debug!("Polling job {}... {}", job_id, status_line(job));
        on_update(job);
    })
    .await?;
    let duration = started.elapsed();

    if job.status != JobStatus::Succeeded {
        return Err(PipelineError::TerminalFailure {
            job_id,
            status: job.status,
        }
        .into());
    }

    let summary = summarize(&job);
    tracing::info!(
        "Airbyte sync completed successfully. Job ID: {}, Total records: {}",
        job_id,
        summary.total_records
    );

    Ok(SyncReport {
        job_id,
        status: job.status,
        duration,
        attempts: job.attempts.len(),
        summary,
        started_at: job.created_at,
        ended_at: job.updated_at,
    })
}

/// Sync with the Airbyte server from `config`, then run the dbt command when
/// `transform` is set and a dbt project is configured.
pub async fn run_pipeline(config: &PipelineConfig, transform: bool) -> Result<SyncReport> {
    config.validate_for_sync()?;

    // Resolve dbt before the sync so a missing executable fails fast
    let runner = if transform && config.dbt.is_configured() {
        Some(DbtRunner::from_config(&config.dbt)?)
    } else {
        None
    };

    let mut client = AirbyteClient::from_config(&config.airbyte)?;
    let mut progress: Option<JobProgress> = None;
    let result = run_sync(
        &mut client,
        &config.airbyte,
        &config.airbyte.poll_options(),
        |job| {
            let bar = progress.get_or_insert_with(|| match &job.id {
                Some(id) => JobProgress::new(id),
                None => JobProgress::hidden(),
            });
            bar.update(job);
        },
    )
    .await;

    if let Some(bar) = &progress {
        bar.abandon();
    }
    let report = result?;

    if let Some(runner) = runner {
        tracing::info!("Running dbt {}", config.dbt.command());
        runner
            .run(config.dbt.command(), &[])
            .await
            .context("dbt step failed after a successful sync")?;
    } else if transform {
        tracing::info!("No dbt project configured; skipping transformation");
    }

    Ok(report)
}
