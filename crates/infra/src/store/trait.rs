use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use carefleet_core::{AggregateId, ExpectedVersion};

use crate::store::document::Document;
use crate::store::query::Query;

/// Document store operation error.
///
/// Infrastructure failures, as opposed to domain errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Narrow persistence contract the engine is written against.
///
/// - `get` / `query` are pure reads.
/// - `create` fails if the key exists.
/// - `update` replaces the whole document; with `ExpectedVersion::Exact(v)` it
///   only succeeds while the stored revision is still `v`.
/// - `server_timestamp` is the store's clock, used for every recorded time.
pub trait DocumentStore<D: Document>: Send + Sync {
    fn get(&self, key: AggregateId) -> Result<Option<D>, StoreError>;

    fn query(&self, query: &Query) -> Result<Vec<D>, StoreError>;

    fn create(&self, doc: D) -> Result<(), StoreError>;

    fn update(&self, doc: D, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn server_timestamp(&self) -> DateTime<Utc>;
}

impl<D, S> DocumentStore<D> for Arc<S>
where
    D: Document,
    S: DocumentStore<D> + ?Sized,
{
    fn get(&self, key: AggregateId) -> Result<Option<D>, StoreError> {
        (**self).get(key)
    }

    fn query(&self, query: &Query) -> Result<Vec<D>, StoreError> {
        (**self).query(query)
    }

    fn create(&self, doc: D) -> Result<(), StoreError> {
        (**self).create(doc)
    }

    fn update(&self, doc: D, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(doc, expected)
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        (**self).server_timestamp()
    }
}
