// ABOUTME: Pipeline configuration loaded from a TOML file and environment variables
// ABOUTME: Passed explicitly into every component; no credentials have built-in defaults

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::airbyte::poll::{PollOptions, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_DELAY};
use crate::error::PipelineError;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CRON: &str = "0 8 * * *";
pub const DEFAULT_TIMEZONE: &str = "Europe/Madrid";
pub const DEFAULT_DBT_EXECUTABLE: &str = "dbt";
pub const DEFAULT_DBT_COMMAND: &str = "build";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub airbyte: AirbyteConfig,
    pub dbt: DbtConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AirbyteConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub connection_id: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbtConfig {
    pub project_dir: Option<PathBuf>,
    pub profiles_dir: Option<PathBuf>,
    pub target_dir: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub cron: Option<String>,
    /// IANA zone the cron expression is evaluated in.
    pub timezone: Option<String>,
}

/// Client id and secret exchanged for a bearer token once per run.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for AirbyteConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AirbyteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("connection_id", &self.connection_id)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PipelineError::Config(format!("missing required setting {}", key)).into()),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        PipelineError::Config(format!("{} has an invalid value: {:?}", key, raw)).into()
    })
}

impl PipelineConfig {
    /// Read the optional TOML file, then overlay process environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Overlay environment variables. Set variables win over file values.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let airbyte = &mut self.airbyte;
        if let Some(v) = var("AIRBYTE_HOST") {
            airbyte.host = Some(v);
        }
        if let Some(v) = var("AIRBYTE_PORT") {
            airbyte.port = Some(parse_env("AIRBYTE_PORT", &v)?);
        }
        if let Some(v) = var("AIRBYTE_CLIENT_ID") {
            airbyte.client_id = Some(v);
        }
        if let Some(v) = var("AIRBYTE_CLIENT_SECRET") {
            airbyte.client_secret = Some(v);
        }
        if let Some(v) = var("AIRBYTE_CONNECTION_ID") {
            airbyte.connection_id = Some(v);
        }
        if let Some(v) = var("AIRBYTE_POLL_INTERVAL_SECS") {
            airbyte.poll_interval_secs = Some(parse_env("AIRBYTE_POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = var("AIRBYTE_TIMEOUT_SECS") {
            airbyte.timeout_secs = Some(parse_env("AIRBYTE_TIMEOUT_SECS", &v)?);
        }

        let dbt = &mut self.dbt;
        if let Some(v) = var("DBT_PROJECT_DIR") {
            dbt.project_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("DBT_PROFILES_DIR") {
            dbt.profiles_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("DBT_TARGET_DIR") {
            dbt.target_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("DBT_MANIFEST_PATH") {
            dbt.manifest_path = Some(PathBuf::from(v));
        }

        if let Some(v) = var("WEATHER_SCHEDULE_CRON") {
            self.schedule.cron = Some(v);
        }
        if let Some(v) = var("EXECUTION_TIMEZONE") {
            self.schedule.timezone = Some(v);
        }

        Ok(())
    }

    /// Check every setting a sync run needs, naming all missing keys at once.
    pub fn validate_for_sync(&self) -> Result<()> {
        let airbyte = &self.airbyte;
        let missing: Vec<&str> = [
            ("airbyte.host", &airbyte.host),
            ("airbyte.client_id", &airbyte.client_id),
            ("airbyte.client_secret", &airbyte.client_secret),
            ("airbyte.connection_id", &airbyte.connection_id),
        ]
        .into_iter()
        .filter(|(_, value)| required(value, "").is_err())
        .map(|(key, _)| key)
        .collect();

        if !missing.is_empty() {
            return Err(PipelineError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            ))
            .into());
        }
        Ok(())
    }
}

impl AirbyteConfig {
    /// Host URL, with `port` appended when the host does not carry one.
    pub fn base_url(&self) -> Result<String> {
        let host = required(&self.host, "airbyte.host")?.trim_end_matches('/');
        let authority = host.split_once("://").map_or(host, |(_, rest)| rest);
        let has_port = authority
            .split('/')
            .next()
            .is_some_and(|a| a.contains(':'));

        Ok(match self.port {
            Some(port) if !has_port => format!("{}:{}", host, port),
            _ => host.to_string(),
        })
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            client_id: required(&self.client_id, "airbyte.client_id")?.to_string(),
            client_secret: required(&self.client_secret, "airbyte.client_secret")?.to_string(),
        })
    }

    pub fn connection_id(&self) -> Result<&str> {
        required(&self.connection_id, "airbyte.connection_id")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: self
                .poll_interval_secs
                .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs),
            retry_delay: self
                .retry_delay_secs
                .map_or(DEFAULT_RETRY_DELAY, Duration::from_secs),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

impl DbtConfig {
    pub fn is_configured(&self) -> bool {
        self.project_dir.is_some()
    }

    pub fn project_dir(&self) -> Result<&Path> {
        self.project_dir.as_deref().ok_or_else(|| {
            PipelineError::Config("missing required setting dbt.project_dir".to_string()).into()
        })
    }

    pub fn profiles_dir(&self) -> Result<PathBuf> {
        match &self.profiles_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.project_dir()?.to_path_buf()),
        }
    }

    pub fn target_dir(&self) -> Result<PathBuf> {
        match &self.target_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.project_dir()?.join("target")),
        }
    }

    pub fn manifest_path(&self) -> Result<PathBuf> {
        match &self.manifest_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.target_dir()?.join("manifest.json")),
        }
    }

    pub fn executable(&self) -> &Path {
        self.executable
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_DBT_EXECUTABLE))
    }

    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or(DEFAULT_DBT_COMMAND)
    }
}

impl ScheduleConfig {
    pub fn cron(&self) -> &str {
        self.cron.as_deref().unwrap_or(DEFAULT_CRON)
    }

    pub fn timezone(&self) -> Result<Tz> {
        let name = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        name.parse::<Tz>().map_err(|_| {
            PipelineError::Config(format!("unknown schedule.timezone {:?}", name)).into()
        })
    }
}
