//! Unified error types for the assignment engine
//!
//! This module provides a common error type [`TamError`] used across the
//! engine, store and CLI crates. Warnings are deliberately *not* errors:
//! they are data accumulated on the output (see [`crate::proposal::Warning`])
//! and never abort a run. `TamError` covers only the fatal taxonomy.
//!
//! # Example
//!
//! ```ignore
//! use tam_core::{TamError, TamResult};
//!
//! fn run(build: &str) -> TamResult<()> {
//!     let snapshot = load_snapshot(build)?;
//!     generate_assignments(snapshot)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all assignment operations.
#[derive(Error, Debug)]
pub enum TamError {
    /// Threshold calibration found zero active, included, non-strategic
    /// reps with a region. Nothing can be assigned.
    #[error("no eligible reps: every rep is inactive, excluded, strategic, or missing a region")]
    NoEligibleReps,

    /// The global wall-time ceiling was reached.
    #[error("run exceeded the wall-time ceiling after {elapsed_secs:.0}s")]
    Timeout { elapsed_secs: f64 },

    /// The caller tripped the cancellation token.
    #[error("run cancelled")]
    Cancelled,

    /// More than the tolerated share of proposal rows failed to persist.
    #[error("proposal write failed: {failed} of {total} rows not persisted")]
    WriteFailed { failed: usize, total: usize },

    /// An internal assertion failed (duplicate proposal, proposal for a
    /// locked account, ...). Indicates a bug; no partial output is written.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Parsing/deserialization errors at the input boundary
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O errors (file access, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using TamError.
pub type TamResult<T> = Result<T, TamError>;

// Conversion from string-like types for convenience
impl From<String> for TamError {
    fn from(s: String) -> Self {
        TamError::Other(s)
    }
}

impl From<&str> for TamError {
    fn from(s: &str) -> Self {
        TamError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for TamError {
    fn from(err: serde_json::Error) -> Self {
        TamError::Parse(err.to_string())
    }
}

impl TamError {
    /// Process exit code for the CLI surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            TamError::NoEligibleReps => 2,
            TamError::Timeout { .. } => 3,
            TamError::Cancelled => 4,
            TamError::WriteFailed { .. } => 5,
            _ => 1,
        }
    }
}
