use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

use carefleet_core::{AggregateId, ExpectedVersion};

use crate::store::document::Document;
use crate::store::query::Query;
use crate::store::r#trait::{DocumentStore, StoreError};

/// In-memory document collection.
///
/// Intended for tests/dev. Each write holds the collection lock for the
/// duration of a single document replace, which is the atomicity the engine
/// relies on. The clock never repeats a value, so ordering by a recorded
/// timestamp is total within one store.
#[derive(Debug)]
pub struct InMemoryDocumentStore<D> {
    docs: RwLock<BTreeMap<AggregateId, D>>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl<D> InMemoryDocumentStore<D> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            last_stamp: Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D> Default for InMemoryDocumentStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl<D: Document> DocumentStore<D> for InMemoryDocumentStore<D> {
    fn get(&self, key: AggregateId) -> Result<Option<D>, StoreError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        Ok(docs.get(&key).cloned())
    }

    fn query(&self, query: &Query) -> Result<Vec<D>, StoreError> {
        let docs = self.docs.read().map_err(|_| poisoned())?;
        let mut matched: Vec<D> = docs.values().filter(|d| query.matches(*d)).cloned().collect();
        drop(docs);

        query.sort(&mut matched);
        Ok(matched)
    }

    fn create(&self, doc: D) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        let key = doc.key();
        if docs.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{}/{key}", D::COLLECTION)));
        }
        docs.insert(key, doc);
        Ok(())
    }

    fn update(&self, doc: D, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        let key = doc.key();
        let current = docs
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{key}", D::COLLECTION)))?;

        let revision = current.revision();
        if !expected.matches(revision) {
            return Err(StoreError::Concurrency(format!(
                "{}/{key}: expected {expected:?}, found {revision}",
                D::COLLECTION
            )));
        }

        docs.insert(key, doc);
        Ok(())
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let Ok(mut last) = self.last_stamp.lock() else {
            return now;
        };
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}
