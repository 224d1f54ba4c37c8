// ABOUTME: Data structures for Airbyte API requests and responses
// ABOUTME: These are serialized to JSON for API communication

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Job identifier assigned by Airbyte. The API hands out integers, but the
/// client treats the value as opaque text and only sends a JSON number back
/// when the id arrived as one.
#[derive(Debug, Clone)]
pub struct JobId {
    value: String,
    numeric: bool,
}

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl PartialEq for JobId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for JobId {}

impl Hash for JobId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        JobId::from(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        JobId {
            value: id,
            numeric: false,
        }
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        JobId {
            value: id.to_string(),
            numeric: true,
        }
    }
}

/// Parses an id typed on the command line. Canonical integers become numeric
/// ids; anything else (including `007`) is kept as text.
impl FromStr for JobId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(n) if n.to_string() == s => JobId::from(n),
            _ => JobId::from(s),
        })
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value.parse::<i64>() {
            Ok(n) if self.numeric => serializer.serialize_i64(n),
            _ => serializer.serialize_str(&self.value),
        }
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => JobId::from(n),
            Raw::Text(s) => JobId::from(s),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Incomplete,
    Succeeded,
    Failed,
    Cancelled,
    /// Missing or unrecognised status. Never terminal.
    #[default]
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Incomplete => "incomplete",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub id: Option<JobId>,
    #[serde(default)]
    pub config_type: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    /// Epoch milliseconds
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
}

impl Job {
    pub fn latest_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub stream_stats: Vec<StreamStat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStat {
    #[serde(default = "unknown_stream")]
    pub stream_name: String,
    #[serde(default)]
    pub stats: StreamStats,
}

fn unknown_stream() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    #[serde(default)]
    pub records_emitted: Option<u64>,
    #[serde(default)]
    pub records_committed: Option<u64>,
    #[serde(default)]
    pub bytes_emitted: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest<'a> {
    pub connection_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct JobIdRequest<'a> {
    pub id: &'a JobId,
}

#[derive(Debug, Deserialize)]
pub struct JobEnvelope {
    pub job: Job,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListRequest<'a> {
    pub config_types: Vec<&'static str>,
    pub config_id: &'a str,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct JobListResponse {
    #[serde(default)]
    pub jobs: Vec<JobEnvelope>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DebugInfo {
    #[serde(default)]
    pub attempts: Vec<AttemptDebugInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttemptDebugInfo {
    #[serde(default)]
    pub logs: AttemptLogs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptLogs {
    #[serde(default)]
    pub log_lines: Vec<String>,
}
