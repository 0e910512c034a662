use crate::remote::RemoteError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("record source unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("session expired, sign in again")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(String),
    #[error("attendance can only be saved for today ({today}), not {date}")]
    InvalidCommitWindow { date: NaiveDate, today: NaiveDate },
    #[error("{0}")]
    ValidationFailed(String),
    #[error("no roster loaded, select a grade and section first")]
    NoRoster,
    #[error("no {0} view is open")]
    NoHistoryScope(&'static str),
    #[error("student {0} is not in the current roster")]
    UnknownStudent(String),
    #[error("history for student {0} could not be loaded, reload before editing")]
    HistoryUnavailable(String),
    #[error("the selection changed while this request was in flight")]
    Superseded,
    #[error("a save is already running, wait for it to finish")]
    CommitInProgress,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::RemoteUnavailable(_) => "remote_unavailable",
            EngineError::Unauthorized => "unauthorized",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidCommitWindow { .. } => "invalid_commit_window",
            EngineError::ValidationFailed(_) => "validation_failed",
            EngineError::NoRoster => "no_roster",
            EngineError::NoHistoryScope(_) => "no_history_scope",
            EngineError::UnknownStudent(_) => "unknown_student",
            EngineError::HistoryUnavailable(_) => "history_unavailable",
            EngineError::Superseded => "superseded",
            EngineError::CommitInProgress => "commit_in_progress",
        }
    }
}

impl From<RemoteError> for EngineError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unauthorized => EngineError::Unauthorized,
            RemoteError::NotFound(what) => EngineError::NotFound(what),
            RemoteError::ValidationFailed(msg) => EngineError::ValidationFailed(msg),
            RemoteError::Unavailable(msg) => EngineError::RemoteUnavailable(msg),
        }
    }
}
