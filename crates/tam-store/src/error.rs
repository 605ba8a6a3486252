//! Store error taxonomy
//!
//! Transient failures (timeouts, dropped connections, cancelled statements,
//! rate limits) are retried with exponential backoff; everything else
//! surfaces immediately.

use thiserror::Error;

/// Errors from the persistence boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing service timed out.
    #[error("store timeout: {0}")]
    Timeout(String),

    /// Connection-level failure.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The backend cancelled the statement.
    #[error("statement canceled: {0}")]
    StatementCanceled(String),

    /// Rate limited.
    #[error("too many requests: {0}")]
    TooManyRequests(String),

    /// The build or entity was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Row-level serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O errors from file-backed stores.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else; never retried.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether a retry can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_)
                | StoreError::Connection(_)
                | StoreError::StatementCanceled(_)
                | StoreError::TooManyRequests(_)
        )
    }
}

/// Convenience type alias for Results using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
