use chrono::{DateTime, Utc};

/// A domain event: an immutable, append-only business fact.
///
/// Implemented by each module's event enum. The metadata here is what the
/// event store persists alongside the serialized payload, and what replay
/// needs to pick the right deserializer.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.product.stock_adjusted").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time, not storage time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
