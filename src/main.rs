// ABOUTME: Command-line entry point for the weather pipeline
// ABOUTME: Parses arguments, loads configuration and dispatches to commands

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use weather_pipeline::airbyte::client::DEFAULT_JOB_PAGE_SIZE;
use weather_pipeline::airbyte::JobId;
use weather_pipeline::PipelineConfig;

#[derive(Parser)]
#[command(
    name = "weather-pipeline",
    version,
    about = "Trigger the weather Airbyte sync, wait for it, then build dbt models"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file. Environment variables override its values
    #[arg(long, global = true, env = "WEATHER_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a sync, wait for it to finish, then run dbt
    Sync {
        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Skip the dbt step
        #[arg(long)]
        no_transform: bool,
    },
    /// Show status and stream statistics of a job
    Status { job_id: JobId },
    /// List recent sync jobs for the configured connection
    Jobs {
        #[arg(long, default_value_t = DEFAULT_JOB_PAGE_SIZE)]
        limit: u32,
    },
    /// Print the log lines of each attempt of a job
    Logs { job_id: JobId },
    /// Wait for an already running job to finish
    Wait {
        job_id: JobId,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run dbt without syncing
    Transform {
        /// Models to build (passed to --select)
        #[arg(long, num_args = 1..)]
        select: Vec<String>,
    },
    /// Regenerate the dbt manifest (dbt deps + dbt compile)
    Compile,
    /// Print the model build order from the dbt manifest
    Models,
    /// Run the full pipeline daily per the configured cron expression
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let mut config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync {
            timeout_secs,
            no_transform,
        } => {
            if timeout_secs.is_some() {
                config.airbyte.timeout_secs = timeout_secs;
            }
            commands::sync(&config, !no_transform).await
        }
        Commands::Status { job_id } => commands::status(&config, job_id).await,
        Commands::Jobs { limit } => commands::jobs(&config, limit).await,
        Commands::Logs { job_id } => commands::logs(&config, job_id).await,
        Commands::Wait {
            job_id,
            timeout_secs,
        } => {
            if timeout_secs.is_some() {
                config.airbyte.timeout_secs = timeout_secs;
            }
            commands::wait(&config, job_id).await
        }
        Commands::Transform { select } => commands::transform(&config, &select).await,
        Commands::Compile => commands::compile(&config).await,
        Commands::Models => commands::models(&config),
        Commands::Schedule => commands::schedule(&config).await,
    }
}
