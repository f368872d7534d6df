//! Error handling primitives shared across the core.

use std::path::PathBuf;

use thiserror::Error;

/// Stable error codes reported by the binary on exit and in log lines.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Prediction, evaluation or refit before the first fit.
    NotFitted = 1,
    /// Batch does not match the expected column layout.
    Schema = 2,
    /// Empty input where at least one row is required.
    EmptyBatch = 3,
    /// Nothing survived transformation.
    NoUsableRows = 4,
    /// Snapshot storage failure.
    Persistence = 5,
    /// Encoding or decoding failure.
    Codec = 6,
    /// Input failed validation.
    InvalidInput = 7,
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("pipeline is not fitted yet")]
    NotFitted,

    #[error("schema error: {0}")]
    Schema(String),

    #[error("empty batch")]
    EmptyBatch,

    #[error("no usable rows left after transformation")]
    NoUsableRows,

    #[error("persistence failure at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Schema helper.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Persistence helper binding the failing path.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Machine parsable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::NotFitted => ErrorCode::NotFitted,
            CoreError::Schema(_) => ErrorCode::Schema,
            CoreError::EmptyBatch => ErrorCode::EmptyBatch,
            CoreError::NoUsableRows => ErrorCode::NoUsableRows,
            CoreError::Persistence { .. } => ErrorCode::Persistence,
            CoreError::Codec(_) => ErrorCode::Codec,
            CoreError::InvalidInput(_) => ErrorCode::InvalidInput,
        }
    }

    /// Whether the streaming loop must stop instead of moving on to the next batch.
    ///
    /// Column alignment is assumed everywhere downstream, so a schema break
    /// ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Schema(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Codec(err.to_string())
    }
}

impl From<csv::Error> for CoreError {
    fn from(err: csv::Error) -> Self {
        CoreError::Codec(err.to_string())
    }
}
