// ABOUTME: Terminal spinner for a job being polled
// ABOUTME: Hidden automatically when stderr is not a terminal

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

use crate::airbyte::models::{Job, JobId};

pub struct JobProgress {
    bar: ProgressBar,
}

impl JobProgress {
    pub fn new(job_id: &JobId) -> Self {
        if !std::io::stderr().is_terminal() {
            return Self::hidden();
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(format!("job {}", job_id));
        bar.set_message("waiting for first status");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn update(&self, job: &Job) {
        self.bar.set_message(status_line(job));
    }

    pub fn finish(&self, job: &Job) {
        self.bar.finish_with_message(status_line(job));
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// One-line description of a job read: status, attempt number, attempt status.
pub fn status_line(job: &Job) -> String {
    let attempt_status = job
        .latest_attempt()
        .map_or("unknown", |attempt| attempt.status.as_str());
    format!(
        "status: {}, attempt #{}, attempt status: {}",
        job.status,
        job.attempts.len(),
        attempt_status
    )
}
