// ABOUTME: Implementations of the CLI subcommands
// ABOUTME: Each command builds its clients from the loaded configuration and prints results

use anyhow::{Context, Result};

use weather_pipeline::airbyte::models::{JobId, JobStatus};
use weather_pipeline::airbyte::{poll_until_terminal, summarize, AirbyteClient, SyncApi};
use weather_pipeline::dbt::{DbtRunner, Manifest};
use weather_pipeline::pipeline::{self, format_timestamp};
use weather_pipeline::progress::JobProgress;
use weather_pipeline::schedule::{self, DailySchedule};
use weather_pipeline::{PipelineConfig, PipelineError};

const MAX_LOG_LINES: usize = 100;

async fn connect(config: &PipelineConfig) -> Result<AirbyteClient> {
    let mut client = AirbyteClient::from_config(&config.airbyte)?;
    client
        .authenticate(&config.airbyte.credentials()?)
        .await
        .context("Failed to authenticate with Airbyte")?;
    Ok(client)
}

pub async fn sync(config: &PipelineConfig, transform: bool) -> Result<()> {
    let report = pipeline::run_pipeline(config, transform).await?;
    println!("{}", report);
    Ok(())
}

pub async fn status(config: &PipelineConfig, job_id: JobId) -> Result<()> {
    let client = connect(config).await?;
    let job = client.get_job(&job_id).await?;

    println!("Job ID: {}", job_id);
    println!("Status: {}", job.status);
    println!("Created: {}", format_timestamp(job.created_at));
    println!("Last Updated: {}", format_timestamp(job.updated_at));

    for (i, attempt) in job.attempts.iter().enumerate() {
        println!();
        println!("Attempt {}:", i + 1);
        println!("  Status: {}", attempt.status);
        println!("  Started: {}", format_timestamp(attempt.created_at));
        println!("  Updated: {}", format_timestamp(attempt.updated_at));
        println!("  Ended: {}", format_timestamp(attempt.ended_at));

        if !attempt.stream_stats.is_empty() {
            println!("  Stream Stats:");
        }
        for stream in &attempt.stream_stats {
            println!("    {}:", stream.stream_name);
            println!(
                "      Records Emitted: {}",
                stream.stats.records_emitted.unwrap_or(0)
            );
            println!(
                "      Bytes Emitted: {}",
                stream.stats.bytes_emitted.unwrap_or(0)
            );
            println!(
                "      Records Committed: {}",
                stream.stats.records_committed.unwrap_or(0)
            );
        }
    }
    Ok(())
}

pub async fn jobs(config: &PipelineConfig, limit: u32) -> Result<()> {
    let connection_id = config.airbyte.connection_id()?;
    let client = connect(config).await?;
    let jobs = client.list_jobs(connection_id, limit).await?;

    if jobs.is_empty() {
        println!("No recent jobs found.");
        return Ok(());
    }

    println!("Recent jobs (most recent first):");
    for (i, job) in jobs.iter().enumerate() {
        let id = job.id.as_ref().map_or("?", JobId::as_str);
        println!("{}. Job ID: {}", i + 1, id);
        println!("   Status: {}", job.status);
        println!("   Created: {}", format_timestamp(job.created_at));
        println!("   Last Updated: {}", format_timestamp(job.updated_at));
    }
    Ok(())
}

pub async fn logs(config: &PipelineConfig, job_id: JobId) -> Result<()> {
    let client = connect(config).await?;
    let info = client.get_debug_info(&job_id).await?;

    for (i, attempt) in info.attempts.iter().enumerate() {
        println!("=== Attempt {} Logs ===", i + 1);
        let lines = &attempt.logs.log_lines;
        if lines.is_empty() {
            println!("No logs available for this attempt.");
            continue;
        }
        for line in lines.iter().take(MAX_LOG_LINES) {
            println!("{}", line);
        }
        if lines.len() > MAX_LOG_LINES {
            println!(
                "... {} more log lines not shown ...",
                lines.len() - MAX_LOG_LINES
            );
        }
    }
    Ok(())
}

pub async fn wait(config: &PipelineConfig, job_id: JobId) -> Result<()> {
    let client = connect(config).await?;
    let progress = JobProgress::new(&job_id);

    let result = poll_until_terminal(
        &client,
        &job_id,
        &config.airbyte.poll_options(),
        |job| progress.update(job),
    )
    .await;

    let job = match result {
        Ok(job) => job,
        Err(e) => {
            progress.abandon();
            return Err(e);
        }
    };
    progress.finish(&job);

    if job.status != JobStatus::Succeeded {
        return Err(PipelineError::TerminalFailure {
            job_id,
            status: job.status,
        }
        .into());
    }

    println!("Job {} succeeded", job_id);
    print!("{}", summarize(&job));
    Ok(())
}

pub async fn transform(config: &PipelineConfig, select: &[String]) -> Result<()> {
    let runner = DbtRunner::from_config(&config.dbt)?;
    runner.run(config.dbt.command(), select).await
}

pub async fn compile(config: &PipelineConfig) -> Result<()> {
    let runner = DbtRunner::from_config(&config.dbt)?;
    let path = runner.compile().await?;
    let manifest = Manifest::load(&path)?;
    println!(
        "Manifest at {} lists {} models",
        runner.manifest_path().display(),
        manifest.len()
    );
    Ok(())
}

pub fn models(config: &PipelineConfig) -> Result<()> {
    let manifest = Manifest::load(&config.dbt.manifest_path()?)?;

    for (i, model) in manifest.build_order()?.into_iter().enumerate() {
        match &model.schema {
            Some(schema) => println!("{}. {}.{}", i + 1, schema, model.name),
            None => println!("{}. {}", i + 1, model.name),
        }
    }
    Ok(())
}

pub async fn schedule(config: &PipelineConfig) -> Result<()> {
    config.validate_for_sync()?;
    let daily: DailySchedule = config.schedule.cron().parse()?;
    let tz = config.schedule.timezone()?;
    schedule::run_daily(config, daily, tz).await
}
