// Table rows and colored rendering

use colored::{ColoredString, Colorize};
use tabled::Tabled;
use taskmill_core::domain::{JobInfo, JobRecord, JobStatus, JobSummary};

#[derive(Tabled)]
pub struct JobRow {
    job_id: String,
    status: String,
    sent: u64,
    processed: u64,
    errors: u64,
    total: String,
    all_sent: bool,
}

impl From<&JobSummary> for JobRow {
    fn from(summary: &JobSummary) -> Self {
        Self::new(&summary.job_id, &summary.info)
    }
}

impl JobRow {
    fn new(job_id: &str, info: &JobInfo) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: colored_status(info.status).to_string(),
            sent: info.sent,
            processed: info.processed,
            errors: info.errors,
            total: info
                .total
                .map_or_else(|| "-".to_string(), |t| t.to_string()),
            all_sent: info.all_sent,
        }
    }
}

#[derive(Tabled)]
pub struct ClaimedJobRow {
    job_id: String,
    job_type: String,
    status: String,
    progress: String,
}

impl From<&JobRecord> for ClaimedJobRow {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            job_type: record.conf.job_type.clone(),
            status: colored_status(record.info.status).to_string(),
            progress: progress(&record.info),
        }
    }
}

pub fn colored_status(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Waiting => status.as_str().yellow(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Paused => status.as_str().magenta(),
        JobStatus::Finished => status.as_str().green(),
    }
}

/// `processed/sent`, with the expected total when known
pub fn progress(info: &JobInfo) -> String {
    match info.total {
        Some(total) => format!("{}/{} (of {})", info.processed, info.sent, total),
        None => format!("{}/{}", info.processed, info.sent),
    }
}
