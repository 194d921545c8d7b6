// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Missing field '{field}' in job {record} record")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("Invalid value for field '{field}': {value}")]
    InvalidField { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
