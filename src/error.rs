//! Error taxonomy of the reading workflow.
//!
//! Collaborator failures are converted into these variants at the boundary of
//! the directory, history retriever and submission assembler, so an operator
//! session never ends on an unhandled error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReadingError>;

#[derive(Error, Debug)]
pub enum ReadingError {
    /// Token or id has no matching active meter. Only blocks the lookup.
    #[error("Meter not found: {0}")]
    NotFound(String),

    #[error("Invalid reading value: {0}")]
    InvalidValue(String),

    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),

    /// Value, evidence or meter selection still missing.
    #[error("Reading is incomplete: {0}")]
    Incomplete(&'static str),

    /// Reading is lower than the previous one and no justification was chosen.
    #[error("Reading is lower than the previous reading; choose a justification")]
    ValidationBlocked,

    #[error("Justification only applies when the reading is lower than the previous one")]
    JustificationNotApplicable,

    #[error("A submission is already in progress")]
    SubmissionInFlight,

    #[error("Operator is not authenticated")]
    NotAuthenticated,

    #[error("Operator {0} may not record readings")]
    AccessDenied(String),

    #[error("Evidence upload failed: {0}")]
    UploadFailure(String),

    #[error("Saving the reading failed: {0}")]
    PersistFailure(String),

    /// Read-side collaborator failure (directory or history lookups).
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ReadingError {
    pub fn storage(err: anyhow::Error) -> Self {
        ReadingError::Storage(format!("{err:#}"))
    }

    /// Failures after which the same pending data may be submitted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReadingError::UploadFailure(_)
                | ReadingError::PersistFailure(_)
                | ReadingError::SubmissionInFlight
        )
    }
}
