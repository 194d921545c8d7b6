// Domain Layer - Job model, key schema and record marshalling

pub mod error;
pub mod job;
pub mod keys;
pub mod marshal;

// Re-exports
pub use error::DomainError;
pub use job::{
    JobConf, JobConfUpdate, JobInfo, JobInfoUpdate, JobRecord, JobStatus, JobSummary,
};
pub use marshal::{Fields, Record};
