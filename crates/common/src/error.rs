//! Error types shared across lipsync crates.

use std::path::PathBuf;

/// Top-level error type for lipsync operations.
#[derive(Debug, thiserror::Error)]
pub enum LipsyncError {
    /// Bad executable path, permissions or settings. Raised before any spawn.
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The recognizer exited non-zero or reported an explicit failure.
    #[error("Recognition failed: {reason}")]
    ProcessFailure {
        reason: String,
        exit_code: Option<i32>,
    },

    /// Malformed or unexpected output from the recognizer.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Upstream data produced an impossible placement. Never clamped.
    #[error("Invariant violation: {context}")]
    InvariantViolation { context: String },

    #[error("Capture cancelled")]
    Cancelled,

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LipsyncError.
pub type LipsyncResult<T> = Result<T, LipsyncError>;

impl LipsyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn invariant(context: impl Into<String>) -> Self {
        Self::InvariantViolation {
            context: context.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn process_failure(reason: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ProcessFailure {
            reason: reason.into(),
            exit_code,
        }
    }
}
