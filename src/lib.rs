// ABOUTME: Library root for the weather pipeline
// ABOUTME: Airbyte sync client, dbt step, schedule and configuration modules

pub mod airbyte;
pub mod config;
pub mod dbt;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod schedule;

pub use config::PipelineConfig;
pub use error::PipelineError;
