//! Error types shared across the judging engine

use thiserror::Error;

use crate::store::SubmissionStatus;

/// Errors that prevent a verdict from being produced.
///
/// Wrong answers, runtime errors and timeouts are *not* errors: they are
/// recorded as failed test cases inside a `Verdict`.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid limits: {0}")]
    InvalidLimits(String),

    #[error("No command specified for execution")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("Submission store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Judge queue is shut down")]
    QueueClosed,
}

impl JudgeError {
    /// Configuration errors are surfaced to the caller and never retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            JudgeError::UnsupportedLanguage(_) | JudgeError::InvalidLimits(_) | JudgeError::Config(_)
        )
    }
}

/// Returned by the orchestrator when a submission ends in `failed`
#[derive(Debug, Error)]
#[error("Judging submission {submission_id} failed: {source}")]
pub struct OrchestrationError {
    pub submission_id: i64,
    #[source]
    pub source: JudgeError,
}

pub type JudgeResult<T> = std::result::Result<T, JudgeError>;
