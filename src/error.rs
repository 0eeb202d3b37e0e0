//! Library-level error types for auto-iflow.
//!
//! Library code returns `IflowError` and does NOT call `std::process::exit()`;
//! the CLI maps errors to exit codes via [`crate::exit_codes`].

use thiserror::Error;

pub use iflow_lock::LockError;

/// Primary error type returned by auto-iflow library operations.
#[derive(Error, Debug)]
pub enum IflowError {
    #[error("Validation failed for {subject}: {count} issue(s)")]
    Validation {
        subject: String,
        issues: Vec<String>,
        count: usize,
    },

    #[error("Authentication is not configured: {reason}")]
    AuthMissing { reason: String },

    #[error("No agent output for {timeout_secs}s; aborting session")]
    StreamIdleTimeout { timeout_secs: u64 },

    #[error("Phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: String, reason: String },

    #[error("Test command failed: {command} (exit {returncode:?})")]
    TestFailure {
        command: String,
        returncode: Option<i32>,
    },

    #[error("Test command timed out after {timeout_secs}s: {command}")]
    TestTimeout { command: String, timeout_secs: u64 },

    #[error("Run cancelled at {checkpoint}")]
    Cancelled { checkpoint: String },

    #[error("Spec directory error: {0}")]
    SpecDir(String),

    #[error("File lock error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model registry error: {0}")]
    Registry(String),
}

impl IflowError {
    /// Build a validation error from an issues list.
    #[must_use]
    pub fn validation(subject: impl Into<String>, issues: Vec<String>) -> Self {
        let count = issues.len();
        Self::Validation {
            subject: subject.into(),
            issues,
            count,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IflowError>;
