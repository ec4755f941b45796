use thiserror::Error;

use crate::session::{JudgmentKey, Phase};

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Record store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Record not found: {record_id}")]
    RecordNotFound { record_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Remote store error: {0}")]
    Remote(#[from] SheetsError),
}

/// Google Sheets values API errors
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Sheets unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Pair sampling errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplerError {
    #[error("Need at least 2 items to generate pairs (got {available})")]
    InsufficientItems { available: usize },

    #[error("Requested {requested} pairs but only {available} distinct pairs exist")]
    TooManyPairs { requested: usize, available: usize },
}

/// Session engine errors.
///
/// `InvalidInput` and `SubmitInFlight` are recoverable: the respondent retries
/// the same pair. `PersistenceFailure` is attached to a single judgment and
/// never ends the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Identity rejected: {reason}")]
    IdentityRejected { reason: String },

    #[error("Cannot {action} while {phase}")]
    InvalidTransition { action: &'static str, phase: Phase },

    #[error("Judgment {key} is still being persisted")]
    SubmitInFlight { key: JudgmentKey },

    #[error("No judgment recorded for {key}")]
    UnknownJudgment { key: JudgmentKey },

    #[error("Persistence failed for {key}: {message}")]
    PersistenceFailure { key: JudgmentKey, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Shorthand for an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the respondent can retry the same action without other changes.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidInput { .. }
                | SessionError::SubmitInFlight { .. }
                | SessionError::PersistenceFailure { .. }
        )
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for record store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Sheets operations
pub type SheetsResult<T> = Result<T, SheetsError>;

/// Result type alias for session engine operations
pub type SessionResult<T> = Result<T, SessionError>;
