// ABOUTME: Daily run schedule parsed from a cron expression
// ABOUTME: Sleeps until the next fire time and runs the full pipeline, forever

use anyhow::Result;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline;

/// A once-a-day schedule. Only cron expressions of the form `M H * * *` are
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl FromStr for DailySchedule {
    type Err = PipelineError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let unsupported = || {
            PipelineError::Config(format!(
                "unsupported schedule {:?}: expected a daily cron expression like \"0 8 * * *\"",
                expr
            ))
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let &[minute, hour, day, month, weekday] = fields.as_slice() else {
            return Err(unsupported());
        };
        if [day, month, weekday].iter().any(|f| *f != "*") {
            return Err(unsupported());
        }

        let minute: u32 = minute.parse().map_err(|_| unsupported())?;
        let hour: u32 = hour.parse().map_err(|_| unsupported())?;
        let at = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(unsupported)?;

        Ok(Self { at })
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "daily at {}", self.at.format("%H:%M"))
    }
}

impl DailySchedule {
    /// First fire time strictly after `now`, in `now`'s time zone. Days where
    /// the local time does not exist are skipped.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        now.date_naive()
            .iter_days()
            .take(3)
            .filter_map(|day| tz.from_local_datetime(&day.and_time(self.at)).earliest())
            .find(|candidate| candidate > now)
    }
}

/// Run the pipeline on `schedule`, evaluated in `tz`, until the process is
/// stopped. A failed run is logged and the loop waits for the next fire time.
pub async fn run_daily(config: &PipelineConfig, schedule: DailySchedule, tz: Tz) -> Result<()> {
    tracing::info!("Pipeline scheduled {} ({})", schedule, tz);

    loop {
        let now = Utc::now().with_timezone(&tz);
        let next = schedule.next_after(&now).ok_or_else(|| {
            PipelineError::Config(format!("no upcoming fire time for schedule {}", schedule))
        })?;
        let wait = (next.clone() - now).to_std().unwrap_or_default();

        tracing::info!("Next pipeline run at {}", next.format("%Y-%m-%d %H:%M:%S %Z"));
        tokio::time::sleep(wait).await;

        match pipeline::run_pipeline(config, true).await {
            Ok(report) => tracing::info!(
                "Scheduled run finished: job {}, {} records",
                report.job_id,
                report.summary.total_records
            ),
            Err(e) => tracing::error!("Scheduled run failed: {:#}", e),
        }
    }
}
