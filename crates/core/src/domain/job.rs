// Job Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Job Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Waiting,
    Running,
    Paused,
    Finished,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "WAITING",
            JobStatus::Running => "RUNNING",
            JobStatus::Paused => "PAUSED",
            JobStatus::Finished => "FINISHED",
        }
    }

    /// A RUNNING job belongs to its orchestrator and must not be deleted.
    pub fn is_deletable(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(JobStatus::Waiting),
            "RUNNING" => Ok(JobStatus::Running),
            "PAUSED" => Ok(JobStatus::Paused),
            "FINISHED" => Ok(JobStatus::Finished),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Job configuration (what to run)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConf {
    pub job_type: String,
    pub params: serde_json::Value,
}

impl JobConf {
    pub fn new(job_type: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            params,
        }
    }
}

/// Job progress and outcome
///
/// Counters only move forward: `processed <= sent`, `errors <= processed`,
/// and `sent` is frozen once `all_sent` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub status: JobStatus,
    pub sent: u64,
    pub processed: u64,
    pub errors: u64,
    /// Producer-declared cap on the number of tasks. `None` means unknown,
    /// which is not the same as a cap of zero.
    pub total: Option<u64>,
    pub all_sent: bool,
    pub result: serde_json::Value,
}

impl JobInfo {
    /// Fresh info for a job about to be queued.
    pub fn waiting(total: Option<u64>) -> Self {
        Self {
            status: JobStatus::Waiting,
            sent: 0,
            processed: 0,
            errors: 0,
            total,
            all_sent: false,
            result: serde_json::Value::Null,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.all_sent && self.processed == self.sent
    }
}

/// Partial update merged into a job conf record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobConfUpdate {
    pub job_type: Option<String>,
    pub params: Option<serde_json::Value>,
}

impl JobConfUpdate {
    pub fn is_empty(&self) -> bool {
        self.job_type.is_none() && self.params.is_none()
    }
}

impl From<&JobConf> for JobConfUpdate {
    fn from(conf: &JobConf) -> Self {
        Self {
            job_type: Some(conf.job_type.clone()),
            params: Some(conf.params.clone()),
        }
    }
}

/// Partial update merged into a job info record
///
/// Fields left as `None` are not written. In particular `total: None` never
/// clears a previously stored cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobInfoUpdate {
    pub status: Option<JobStatus>,
    pub sent: Option<u64>,
    pub processed: Option<u64>,
    pub errors: Option<u64>,
    pub total: Option<u64>,
    pub all_sent: Option<bool>,
    pub result: Option<serde_json::Value>,
}

impl JobInfoUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn all_sent() -> Self {
        Self {
            all_sent: Some(true),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.sent.is_none()
            && self.processed.is_none()
            && self.errors.is_none()
            && self.total.is_none()
            && self.all_sent.is_none()
            && self.result.is_none()
    }
}

impl From<&JobInfo> for JobInfoUpdate {
    fn from(info: &JobInfo) -> Self {
        Self {
            status: Some(info.status),
            sent: Some(info.sent),
            processed: Some(info.processed),
            errors: Some(info.errors),
            total: info.total,
            all_sent: Some(info.all_sent),
            result: Some(info.result.clone()),
        }
    }
}

/// One entry of a job listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    #[serde(flatten)]
    pub info: JobInfo,
}

/// A job with both of its records, as handed to an orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub conf: JobConf,
    pub info: JobInfo,
}
