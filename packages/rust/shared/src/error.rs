//! Error types for LeadFlow.
//!
//! Library crates use [`LeadFlowError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LeadFlow operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadFlowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Input rejection before any batch state exists (missing file,
    /// oversized upload, unparseable table).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// CSV parse or serialize error for a specific table.
    #[error("csv error at {path:?}: {message}")]
    Csv { path: PathBuf, message: String },

    /// Store layer error (progress document, intel store, snapshots).
    #[error("storage error: {0}")]
    Storage(String),

    /// Inference client construction error. `generate` itself never fails.
    #[error("inference error: {0}")]
    Inference(String),

    /// Model payload extraction or deserialization error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A batch or lead lookup found nothing.
    #[error("not found: {what}")]
    NotFound { what: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadFlowError>;

impl LeadFlowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a CSV error tied to a table path.
    pub fn csv(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Csv {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error naming what was looked up.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}
