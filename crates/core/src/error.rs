//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, invariants, conflicts).
/// Storage and propagation failures are modelled by the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (quantity < 1, missing required id, empty name).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant would be violated (e.g. leaving a terminal status).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Referenced asset/order/delivery/pickup does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Current state differs from what the caller expected (compare-and-swap,
    /// stale version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Order creation attempted while some product lines are under-assigned.
    #[error("items not fully assigned: lines {lines:?}")]
    IncompleteAssignment { lines: Vec<u32> },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_assignment_lists_lines() {
        let err = DomainError::IncompleteAssignment { lines: vec![1, 3] };
        assert_eq!(err.to_string(), "items not fully assigned: lines [1, 3]");
    }

    #[test]
    fn not_found_names_the_missing_record() {
        let err = DomainError::not_found("asset 42");
        assert_eq!(err.to_string(), "not found: asset 42");
    }
}
