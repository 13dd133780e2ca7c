//! In-memory change feed for tests/dev and single-process deployments.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::bus::{BusError, Callback, EventBus, Filter, Subscription};

struct Subscriber<M> {
    id: u64,
    filter: Filter<M>,
    callback: Callback<M>,
}

type Registry<M> = Arc<Mutex<Vec<Subscriber<M>>>>;

/// In-memory pub/sub bus.
///
/// - No IO
/// - Synchronous fan-out on the publishing thread
/// - Callbacks run outside the registry lock, so a callback may publish or
///   subscribe without deadlocking
pub struct InMemoryEventBus<M> {
    subscribers: Registry<M>,
    next_id: AtomicU64,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Send + Sync + 'static,
{
    fn publish(&self, message: M) -> Result<(), BusError> {
        let targets: Vec<Callback<M>> = {
            let subs = self.subscribers.lock().map_err(|_| BusError::Poisoned)?;
            subs.iter()
                .filter(|s| (s.filter)(&message))
                .map(|s| s.callback.clone())
                .collect()
        };

        for callback in targets {
            callback(&message);
        }

        Ok(())
    }

    fn subscribe(&self, filter: Filter<M>, callback: Callback<M>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let Ok(mut subs) = self.subscribers.lock() else {
            tracing::warn!("change feed registry poisoned; subscription not registered");
            return Subscription::inert();
        };
        subs.push(Subscriber {
            id,
            filter,
            callback,
        });
        drop(subs);

        let registry = Arc::downgrade(&self.subscribers);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                if let Ok(mut subs) = registry.lock() {
                    subs.retain(|s| s.id != id);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn collecting() -> (Arc<StdMutex<Vec<u32>>>, Callback<u32>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: Callback<u32> = Arc::new(move |m: &u32| sink.lock().unwrap().push(*m));
        (seen, callback)
    }

    #[test]
    fn filter_selects_messages_per_subscriber() {
        let bus = InMemoryEventBus::<u32>::new();
        let (evens, cb_even) = collecting();
        let (all, cb_all) = collecting();

        let _s1 = bus.subscribe(Arc::new(|m: &u32| m % 2 == 0), cb_even);
        let _s2 = bus.subscribe(Arc::new(|_: &u32| true), cb_all);

        for m in 1..=4 {
            bus.publish(m).unwrap();
        }

        assert_eq!(*evens.lock().unwrap(), vec![2, 4]);
        assert_eq!(*all.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = InMemoryEventBus::<u32>::new();
        let (seen, cb) = collecting();
        let sub = bus.subscribe(Arc::new(|_: &u32| true), cb);

        bus.publish(1).unwrap();
        sub.unsubscribe();
        bus.publish(2).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let bus = InMemoryEventBus::<u32>::new();
        let (seen, cb) = collecting();
        {
            let _sub = bus.subscribe(Arc::new(|_: &u32| true), cb);
            bus.publish(7).unwrap();
        }
        bus.publish(8).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn callback_may_subscribe_without_deadlock() {
        let bus = Arc::new(InMemoryEventBus::<u32>::new());
        let inner_bus = bus.clone();
        let nested = Arc::new(StdMutex::new(Vec::new()));
        let nested_sink = nested.clone();

        let _outer = bus.subscribe(
            Arc::new(|_: &u32| true),
            Arc::new(move |_: &u32| {
                let sub = inner_bus.subscribe(Arc::new(|_: &u32| true), Arc::new(|_: &u32| {}));
                nested_sink.lock().unwrap().push(format!("{sub:?}"));
            }),
        );

        bus.publish(1).unwrap();
        assert_eq!(nested.lock().unwrap().len(), 1);
    }
}
