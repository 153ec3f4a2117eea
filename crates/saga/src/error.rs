//! Saga error types.

use thiserror::Error;

/// Errors surfaced by individual saga steps and their backing store.
#[derive(Debug, Error)]
pub enum SagaStepError {
    /// The organization slug is already taken. On this path the unique
    /// slug constraint is the only dedupe gate for duplicate submissions.
    #[error("organization slug '{0}' is already taken")]
    SlugTaken(String),

    /// A row the step expected to operate on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors that can occur during saga execution.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step failed; all previously completed steps were compensated
    /// in reverse order before this error was returned.
    #[error("saga step '{step}' failed: {source}")]
    StepFailed {
        step: &'static str,
        #[source]
        source: SagaStepError,
    },
}

impl SagaError {
    /// Returns true if the failure was a slug collision, the dedupe gate
    /// for duplicate sales-led submissions.
    pub fn is_slug_taken(&self) -> bool {
        matches!(
            self,
            SagaError::StepFailed {
                source: SagaStepError::SlugTaken(_),
                ..
            }
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
