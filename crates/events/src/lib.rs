//! Domain events and the in-process change feed.
//!
//! Aggregates emit typed [`Event`]s. After a write succeeds, infrastructure
//! publishes a [`ChangeEnvelope`] carrying the new document snapshot on an
//! [`EventBus`]; read-model consumers subscribe with a filter and a callback.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{BusError, Callback, EventBus, Filter, Subscription};
pub use envelope::ChangeEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
