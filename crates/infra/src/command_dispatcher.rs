//! Command execution pipeline for document-backed aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the current document (or start from an empty aggregate)
//!   ↓
//! 2. Handle command (pure decision, produces events)
//!   ↓
//! 3. Apply events to compute the next document
//!   ↓
//! 4. Write it back, guarded by the loaded revision
//!   ↓
//! 5. Publish the post-write snapshot on the change feed
//! ```
//!
//! A lost version race reloads and re-decides, so the aggregate's own checks
//! (including compare-and-swap on status) always run against fresh state.

use std::sync::Arc;

use carefleet_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use carefleet_events::{ChangeEnvelope, Event, EventBus};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{Document, DocumentStore, StoreError};

/// Type-erased store for one collection.
pub type SharedStore<D> = Arc<dyn DocumentStore<D>>;

/// Type-erased change feed for one collection.
pub type SharedBus<D> = Arc<dyn EventBus<ChangeEnvelope<D>>>;

/// Dispatcher over a type-erased store and feed, as held by the services.
pub type SharedDispatcher<D> = CommandDispatcher<SharedStore<D>, SharedBus<D>>;

/// Result of a successful dispatch: the stored document and the events that
/// produced it. `events` is empty when the command was a no-op.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    pub document: A,
    pub events: Vec<A::Event>,
}

#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    write_retries: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            write_retries: 3,
        }
    }

    pub fn with_write_retries(mut self, retries: u32) -> Self {
        self.write_retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn dispatch<A>(
        &self,
        key: AggregateId,
        command: &A::Command,
        make_aggregate: impl Fn() -> A,
    ) -> ServiceResult<Dispatched<A>>
    where
        A: Aggregate<Error = DomainError> + Document,
        A::Event: Event,
        S: DocumentStore<A>,
        B: EventBus<ChangeEnvelope<A>>,
    {
        let mut attempt = 0u32;
        loop {
            // 1) Load
            let (mut aggregate, expected) = match self.store.get(key)? {
                Some(doc) => {
                    let revision = doc.revision();
                    (doc, Some(revision))
                }
                None => (make_aggregate(), None),
            };

            // 2) Decide
            let events = aggregate.handle(command).map_err(ServiceError::from)?;
            if events.is_empty() {
                return Ok(Dispatched {
                    document: aggregate,
                    events,
                });
            }

            // 3) Evolve
            for ev in &events {
                aggregate.apply(ev);
            }

            // 4) Persist
            let written = match expected {
                Some(revision) => self
                    .store
                    .update(aggregate.clone(), ExpectedVersion::Exact(revision)),
                None => self.store.create(aggregate.clone()),
            };

            match written {
                Ok(()) => {}
                Err(StoreError::Concurrency(msg)) | Err(StoreError::AlreadyExists(msg))
                    if attempt < self.write_retries =>
                {
                    attempt += 1;
                    tracing::debug!(collection = A::COLLECTION, %key, attempt, %msg, "write lost a version race; retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            // 5) Publish
            if let Some(last) = events.last() {
                let envelope = ChangeEnvelope::new(
                    key,
                    A::COLLECTION,
                    last.event_type(),
                    aggregate.revision(),
                    aggregate.clone(),
                );
                if let Err(e) = self.bus.publish(envelope) {
                    tracing::warn!(collection = A::COLLECTION, %key, error = %e, "change feed publish failed");
                }
            }

            return Ok(Dispatched {
                document: aggregate,
                events,
            });
        }
    }
}
