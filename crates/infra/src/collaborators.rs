//! External collaborators: upstream requirement/lead records and blob storage.
//!
//! Both are narrow traits with in-memory implementations. Upstream
//! propagation is best-effort: [`propagate`] logs failures at `warn` and never
//! returns them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use carefleet_core::Actor;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("upstream record unavailable: {0}")]
    Upstream(String),

    #[error("blob store failure: {0}")]
    Blob(String),
}

/// History line appended to an upstream requirement/lead record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamEntry {
    pub at: DateTime<Utc>,
    pub by: String,
    pub by_name: String,
    pub kind: String,
    pub message: String,
}

impl UpstreamEntry {
    pub fn new(at: DateTime<Utc>, actor: &Actor, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            at,
            by: actor.uid.clone(),
            by_name: actor.display_name.clone(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

pub trait UpstreamSink: Send + Sync {
    fn append_history(&self, upstream_ref: &str, entry: UpstreamEntry) -> Result<(), CollaboratorError>;

    fn set_status(&self, upstream_ref: &str, status: &str) -> Result<(), CollaboratorError>;
}

impl<U> UpstreamSink for Arc<U>
where
    U: UpstreamSink + ?Sized,
{
    fn append_history(&self, upstream_ref: &str, entry: UpstreamEntry) -> Result<(), CollaboratorError> {
        (**self).append_history(upstream_ref, entry)
    }

    fn set_status(&self, upstream_ref: &str, status: &str) -> Result<(), CollaboratorError> {
        (**self).set_status(upstream_ref, status)
    }
}

/// Sink for deployments without upstream records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUpstream;

impl UpstreamSink for NoopUpstream {
    fn append_history(&self, _upstream_ref: &str, _entry: UpstreamEntry) -> Result<(), CollaboratorError> {
        Ok(())
    }

    fn set_status(&self, _upstream_ref: &str, _status: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// In-memory upstream records: latest status and history per reference.
#[derive(Debug, Default)]
pub struct InMemoryUpstream {
    statuses: Mutex<HashMap<String, String>>,
    history: Mutex<HashMap<String, Vec<UpstreamEntry>>>,
    unavailable: bool,
}

impl InMemoryUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn status(&self, upstream_ref: &str) -> Option<String> {
        self.statuses.lock().ok()?.get(upstream_ref).cloned()
    }

    pub fn history(&self, upstream_ref: &str) -> Vec<UpstreamEntry> {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.get(upstream_ref).cloned())
            .unwrap_or_default()
    }

    fn check_available(&self, upstream_ref: &str) -> Result<(), CollaboratorError> {
        if self.unavailable {
            return Err(CollaboratorError::Upstream(upstream_ref.to_string()));
        }
        Ok(())
    }
}

impl UpstreamSink for InMemoryUpstream {
    fn append_history(&self, upstream_ref: &str, entry: UpstreamEntry) -> Result<(), CollaboratorError> {
        self.check_available(upstream_ref)?;
        let mut history = self
            .history
            .lock()
            .map_err(|_| CollaboratorError::Upstream("lock poisoned".to_string()))?;
        history.entry(upstream_ref.to_string()).or_default().push(entry);
        Ok(())
    }

    fn set_status(&self, upstream_ref: &str, status: &str) -> Result<(), CollaboratorError> {
        self.check_available(upstream_ref)?;
        let mut statuses = self
            .statuses
            .lock()
            .map_err(|_| CollaboratorError::Upstream("lock poisoned".to_string()))?;
        statuses.insert(upstream_ref.to_string(), status.to_string());
        Ok(())
    }
}

/// Run one upstream call; failures are logged, never surfaced.
pub fn propagate(
    upstream_ref: &str,
    what: &str,
    call: impl FnOnce() -> Result<(), CollaboratorError>,
) {
    if let Err(e) = call() {
        tracing::warn!(upstream_ref, what, error = %e, "upstream propagation failed");
    }
}

/// Opaque file storage. The returned url is treated as an opaque string.
pub trait BlobStore: Send + Sync {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, CollaboratorError>;
}

impl<T> BlobStore for Arc<T>
where
    T: BlobStore + ?Sized,
{
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, CollaboratorError> {
        (**self).upload(path, bytes)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let path = url.strip_prefix("mem://")?;
        self.blobs.read().ok()?.get(path).cloned()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String, CollaboratorError> {
        if path.trim().is_empty() {
            return Err(CollaboratorError::Blob("empty path".to_string()));
        }
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| CollaboratorError::Blob("lock poisoned".to_string()))?;
        blobs.insert(path.to_string(), bytes.to_vec());
        Ok(format!("mem://{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_upstream_records_status_and_history() {
        let upstream = InMemoryUpstream::new();
        upstream.set_status("req-1", "active").unwrap();
        upstream
            .append_history("req-1", UpstreamEntry::new(Utc::now(), &Actor::system(), "order_status", "active"))
            .unwrap();

        assert_eq!(upstream.status("req-1").as_deref(), Some("active"));
        assert_eq!(upstream.history("req-1").len(), 1);
        assert!(upstream.history("req-2").is_empty());
    }

    #[test]
    fn propagate_swallows_failures() {
        let upstream = InMemoryUpstream::unavailable();
        propagate("req-1", "status", || upstream.set_status("req-1", "active"));
        assert_eq!(upstream.status("req-1"), None);
    }

    #[test]
    fn blob_urls_resolve_back_to_bytes() {
        let blobs = InMemoryBlobStore::new();
        let url = blobs.upload("proofs/p1/photo-1.jpg", b"jpeg").unwrap();
        assert_eq!(url, "mem://proofs/p1/photo-1.jpg");
        assert_eq!(blobs.get(&url), Some(b"jpeg".to_vec()));
        assert!(blobs.upload(" ", b"x").is_err());
    }
}
