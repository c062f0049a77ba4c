//! Workflow errors

use thiserror::Error;
use tradeflow_store::{Retryable, StoreError};

/// Errors from the workflow engine
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Persistence fault: {0}")]
    Persistence(StoreError),
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            other => WorkflowError::Persistence(other),
        }
    }
}

impl Retryable for WorkflowError {
    /// Only transient persistence faults; business-rule rejections are final
    fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Persistence(err) => err.is_transient(),
            _ => false,
        }
    }
}
