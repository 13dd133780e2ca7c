//! Service-level error model.
//!
//! Maps domain and store failures into one enum for callers of the ledger,
//! resolver and desks. Soft outcomes (dropped capacity, partial batches,
//! propagation failures) are reported in result values, not here, except a
//! batch in which every unit failed.

use thiserror::Error;

use carefleet_core::DomainError;

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed input. Surfaced immediately, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Current state differs from what the caller expected.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("items not fully assigned: lines {lines:?}")]
    IncompleteAssignment { lines: Vec<u32> },

    /// A version race was lost more times than the retry budget allows.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// Every unit of a batch failed.
    #[error("all {attempted} units failed; first error: {first}")]
    AllFailed { attempted: usize, first: String },

    #[error("blob upload failed: {0}")]
    Blob(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DomainError::NotFound(msg) => ServiceError::NotFound(msg),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::IncompleteAssignment { lines } => ServiceError::IncompleteAssignment { lines },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => ServiceError::Concurrency(msg),
            StoreError::NotFound(msg) => ServiceError::NotFound(msg),
            other => ServiceError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_category() {
        let err: ServiceError = DomainError::IncompleteAssignment { lines: vec![2] }.into();
        assert_eq!(err, ServiceError::IncompleteAssignment { lines: vec![2] });

        let err: ServiceError = DomainError::invalid_id("zz").into();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn store_concurrency_becomes_concurrency() {
        let err: ServiceError = StoreError::Concurrency("assets/1".to_string()).into();
        assert!(matches!(err, ServiceError::Concurrency(_)));

        let err: ServiceError = StoreError::Backend("down".to_string()).into();
        assert!(matches!(err, ServiceError::Store(_)));
    }
}
