//! Per-unit results of multi-asset operations.
//!
//! Batches are sequences of independent single-document writes. Nothing is
//! rolled back: the outcome lists what succeeded and what failed, and only a
//! batch in which every unit failed becomes an error.

use carefleet_assets::AssetId;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub asset_id: AssetId,
    pub error: ServiceError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome<T = AssetId> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&mut self, value: T) {
        self.succeeded.push(value);
    }

    pub fn fail(&mut self, asset_id: AssetId, error: ServiceError) {
        self.failed.push(BatchFailure { asset_id, error });
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<AssetId> {
        self.failed.iter().map(|f| f.asset_id).collect()
    }

    /// Log a partial failure at `warn`. Silent for complete or empty batches.
    pub fn log_partial(&self, operation: &str) {
        if !self.failed.is_empty() && !self.succeeded.is_empty() {
            tracing::warn!(
                operation,
                succeeded = self.succeeded.len(),
                failed = self.failed.len(),
                failed_ids = ?self.failed_ids(),
                "batch partially failed"
            );
        }
    }

    /// `Err(AllFailed)` only when units were attempted and none succeeded.
    pub fn into_result(self, operation: &str) -> ServiceResult<Self> {
        if self.succeeded.is_empty() {
            if let Some(first) = self.failed.first() {
                tracing::warn!(operation, attempted = self.failed.len(), "every unit of the batch failed");
                return Err(ServiceError::AllFailed {
                    attempted: self.failed.len(),
                    first: first.error.to_string(),
                });
            }
        }
        self.log_partial(operation);
        Ok(self)
    }
}
