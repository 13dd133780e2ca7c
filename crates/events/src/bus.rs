//! Change-feed publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes change notifications to read-model consumers (UI
//! caches, dashboards). It is not a source of truth: documents live in the
//! store, and a missed notification is recovered by querying again.
//!
//! ## Delivery
//!
//! - Notifications are delivered synchronously on the publisher's thread, after
//!   the write that produced them has succeeded.
//! - Each subscriber sees only the messages its filter accepts.
//! - Subscribers must not assume exactly-once delivery; callbacks should be
//!   idempotent with respect to `sequence_number`.

use std::sync::Arc;

use thiserror::Error;

/// Predicate deciding whether a subscriber wants a message.
pub type Filter<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

/// Callback invoked for each accepted message.
pub type Callback<M> = Arc<dyn Fn(&M) + Send + Sync>;

/// Publication failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The subscriber registry lock was poisoned by a panicking callback.
    #[error("subscriber registry lock poisoned")]
    Poisoned,
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops
/// delivery to the associated callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that was never registered (e.g. the registry was
    /// unavailable). Unsubscribing it does nothing.
    pub fn inert() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Transport-agnostic change feed.
///
/// `Send + Sync` so one bus can be shared between the services that publish to
/// it and the consumers that subscribe.
pub trait EventBus<M>: Send + Sync {
    fn publish(&self, message: M) -> Result<(), BusError>;

    fn subscribe(&self, filter: Filter<M>, callback: Callback<M>) -> Subscription;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    fn publish(&self, message: M) -> Result<(), BusError> {
        (**self).publish(message)
    }

    fn subscribe(&self, filter: Filter<M>, callback: Callback<M>) -> Subscription {
        (**self).subscribe(filter, callback)
    }
}
