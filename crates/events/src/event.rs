use chrono::{DateTime, Utc};

/// A domain event.
///
/// Events are immutable facts. Each aggregate's `apply` turns exactly one event
/// into exactly one state change (and, for assets, exactly one history entry).
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "assets.asset.checked_in").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (store time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
