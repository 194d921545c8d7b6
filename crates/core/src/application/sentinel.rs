// Script failure sentinels and their translation into AppError

use std::str::FromStr;

use crate::error::AppError;

/// Raw failure reply of an atomic script
///
/// Carries the text exactly as the script produced it so that replies this
/// crate does not know about are surfaced unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptAbort(pub String);

/// Outcome of a script that ran to completion against the store
pub type ScriptResult<T> = std::result::Result<T, ScriptAbort>;

/// Closed set of failure replies scripts may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    JobExists,
    NoJob,
    LockExists,
    MustBeRunning,
    MustBePaused,
    MustBeWaitingPausedFinished,
}

impl Sentinel {
    pub const ALL: [Sentinel; 6] = [
        Sentinel::JobExists,
        Sentinel::NoJob,
        Sentinel::LockExists,
        Sentinel::MustBeRunning,
        Sentinel::MustBePaused,
        Sentinel::MustBeWaitingPausedFinished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::JobExists => "job_exists",
            Sentinel::NoJob => "no_job",
            Sentinel::LockExists => "lock_exists",
            Sentinel::MustBeRunning => "must_be_running",
            Sentinel::MustBePaused => "must_be_paused",
            Sentinel::MustBeWaitingPausedFinished => "must_be_waiting_paused_finished",
        }
    }

    pub fn abort(self) -> ScriptAbort {
        ScriptAbort(self.as_str().to_string())
    }

    /// Domain error for this sentinel
    pub fn to_error(self) -> AppError {
        match self {
            Sentinel::JobExists => AppError::AlreadyExists("The job already exists".to_string()),
            Sentinel::NoJob => AppError::NotFound("The job doesn't exist".to_string()),
            Sentinel::LockExists => AppError::LockConflict("The lock already exists".to_string()),
            Sentinel::MustBeRunning => {
                AppError::InvalidState("The job must be running".to_string())
            }
            Sentinel::MustBePaused => AppError::InvalidState("The job must be paused".to_string()),
            Sentinel::MustBeWaitingPausedFinished => AppError::InvalidState(
                "The job must be waiting or paused or finished".to_string(),
            ),
        }
    }
}

impl FromStr for Sentinel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sentinel::ALL
            .into_iter()
            .find(|sentinel| sentinel.as_str() == s)
            .ok_or(())
    }
}

/// Translate a script failure reply; unknown replies are fatal.
pub fn translate(abort: ScriptAbort) -> AppError {
    match abort.0.parse::<Sentinel>() {
        Ok(sentinel) => sentinel.to_error(),
        Err(()) => AppError::UnexpectedScriptReply(abort.0),
    }
}
