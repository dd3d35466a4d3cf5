//! Job error types.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
///
/// Item bodies return these to signal failure; the engine returns them to
/// callers that misuse it.
#[derive(Debug, Error)]
pub enum JobError {
    /// Item execution failed.
    #[error("Job item execution failed: {0}")]
    ExecutionFailed(String),

    /// Item execution panicked.
    #[error("Job item panicked: {0}")]
    Panicked(String),

    /// A job was created without items.
    #[error("A job must contain at least one item")]
    EmptyJob,

    /// An item's index does not match its position in the job.
    #[error("Job item at position {position} reports index {index}")]
    IndexMismatch { position: usize, index: usize },

    /// Another job is still active on the engine.
    #[error("Job engine is busy with another job")]
    EngineBusy,

    /// The engine has been told to terminate.
    #[error("Job engine has been terminated")]
    EngineTerminated,

    /// The job was already handed to an engine or run immediately.
    #[error("Job {0} has already been submitted")]
    AlreadySubmitted(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error raised by domain code inside an item body.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Shorthand for an item reporting failure.
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::ExecutionFailed(message.into())
    }

    /// Returns true if this error is a programming error by the caller of
    /// the engine rather than a failure of item execution.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            JobError::EmptyJob
                | JobError::IndexMismatch { .. }
                | JobError::EngineBusy
                | JobError::EngineTerminated
                | JobError::AlreadySubmitted(_)
        )
    }

    /// Returns true if this error came out of an item body.
    pub fn is_item_failure(&self) -> bool {
        matches!(
            self,
            JobError::ExecutionFailed(_) | JobError::Panicked(_) | JobError::Other(_)
        )
    }
}

impl From<morpho_core::MorphoError> for JobError {
    fn from(err: morpho_core::MorphoError) -> Self {
        match err {
            morpho_core::MorphoError::Configuration(msg) => JobError::Configuration(msg),
            other => JobError::Internal(other.to_string()),
        }
    }
}
