//! Integrity errors

use thiserror::Error;
use tradeflow_store::{Retryable, StoreError};

/// Errors from blob access and verification.
///
/// A hash mismatch is not an error: it is reported in the
/// [`VerificationReport`](crate::VerificationReport).
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Blob '{url}' unavailable: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Persistence fault: {0}")]
    Persistence(StoreError),
}

/// Result type for integrity operations
pub type IntegrityResult<T> = Result<T, IntegrityError>;

impl IntegrityError {
    pub fn io(url: impl Into<String>, source: std::io::Error) -> Self {
        IntegrityError::Io {
            url: url.into(),
            source,
        }
    }
}

impl From<StoreError> for IntegrityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => IntegrityError::NotFound { entity, id },
            other => IntegrityError::Persistence(other),
        }
    }
}

impl Retryable for IntegrityError {
    /// Blob reads and transient persistence faults may succeed on retry.
    /// A malformed blob key never will.
    fn is_retryable(&self) -> bool {
        match self {
            IntegrityError::Io { source, .. } => source.kind() != std::io::ErrorKind::InvalidInput,
            IntegrityError::Persistence(err) => err.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_is_retryable() {
        let err = IntegrityError::io("abc", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_malformed_key_is_final() {
        let source = io::Error::new(io::ErrorKind::InvalidInput, "not a blob key");
        let err = IntegrityError::io("../etc", source);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rule_errors_are_final() {
        assert!(!IntegrityError::InvalidTransition("stale".into()).is_retryable());
        assert!(!IntegrityError::Unauthorized("role".into()).is_retryable());
    }

    #[test]
    fn test_store_not_found_maps() {
        let err = IntegrityError::from(StoreError::NotFound {
            entity: "document",
            id: 3,
        });
        assert!(matches!(err, IntegrityError::NotFound { id: 3, .. }));
    }
}
