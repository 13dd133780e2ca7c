//! `carefleet-core` — domain building blocks shared by the rental subsystem.
//!
//! This crate contains **pure domain** primitives (no storage, no IO).

pub mod actor;
pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use actor::Actor;
pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, BranchId, UserId};
pub use value_object::ValueObject;
