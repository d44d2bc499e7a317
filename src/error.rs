//! Error types

use thiserror::Error;

/// Session lifecycle errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("nothing to score: the timer was never started")]
    PrematureFinalize,

    #[error("session already finished")]
    AlreadyFinished,

    #[error("session cannot be armed while {0}")]
    NotArmable(&'static str),
}

/// Persistence failures. A failed write never invalidates the score itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Exam configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("exam text is required")]
    EmptyText,

    #[error("duration must be a positive number of seconds, got {0}")]
    InvalidDuration(u64),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid exam configuration: {0}")]
    Json(#[from] serde_json::Error),
}
