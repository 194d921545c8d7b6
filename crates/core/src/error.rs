// Central Error Type for the Backend

use thiserror::Error;

/// Application-level error type
///
/// The first four variants form the taxonomy orchestrators are expected to
/// handle. Everything else means the store or its contents can no longer be
/// trusted by this layer.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Lock conflict: {0}")]
    LockConflict(String),

    #[error("Unexpected script reply: {0}")]
    UnexpectedScriptReply(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether the caller can act on this error (as opposed to treating the
    /// store as being in an unknown state).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::AlreadyExists(_)
                | AppError::NotFound(_)
                | AppError::InvalidState(_)
                | AppError::LockConflict(_)
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Store(String)
