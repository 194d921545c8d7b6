//! Store key builders and field name constants for job records.
//!
//! Every component addresses the store through these; nothing formats keys
//! ad hoc. A job exists iff its info record exists.

/// Ordered set of every job id, compared lexicographically.
pub const JOB_IDS: &str = "taskmill:job:ids";

/// FIFO of WAITING job ids: pushed at the front, claimed from the back.
pub const JOB_QUEUE: &str = "taskmill:job:queue";

/// Job config record: `taskmill:job:config:{job_id}`
#[must_use]
pub fn job_conf(job_id: &str) -> String {
    format!("taskmill:job:config:{job_id}")
}

/// Job info record: `taskmill:job:info:{job_id}`
#[must_use]
pub fn job_info(job_id: &str) -> String {
    format!("taskmill:job:info:{job_id}")
}

/// In-flight task set of a job: `taskmill:job:tasks:{job_id}`
#[must_use]
pub fn job_tasks(job_id: &str) -> String {
    format!("taskmill:job:tasks:{job_id}")
}

/// Jobs claimed by an orchestrator: `taskmill:orchestrator:jobs:{orchestrator_id}`
#[must_use]
pub fn orchestrator_jobs(orchestrator_id: &str) -> String {
    format!("taskmill:orchestrator:jobs:{orchestrator_id}")
}

/// Field name constants for type-safe record access.
pub mod fields {
    pub mod conf {
        pub const JOB_TYPE: &str = "job_type";
        pub const PARAMS: &str = "params";
    }

    pub mod info {
        pub const STATUS: &str = "status";
        pub const SENT: &str = "sent";
        pub const PROCESSED: &str = "processed";
        pub const ERRORS: &str = "errors";
        pub const TOTAL: &str = "total";
        pub const ALL_SENT: &str = "all_sent";
        pub const RESULT: &str = "result";
    }
}
