//! Document store abstraction (single-document atomic writes).
//!
//! Every record in the subsystem (asset, order, delivery, pickup, product) is
//! one document. A write replaces the whole document and is atomic on its
//! own; there are no multi-document transactions. Optimistic concurrency via
//! [`ExpectedVersion`](carefleet_core::ExpectedVersion) is the only
//! coordination primitive.

pub mod document;
pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use document::{Document, FieldValue};
pub use in_memory::InMemoryDocumentStore;
pub use query::{Direction, OrderBy, Query};
pub use r#trait::{DocumentStore, StoreError};
