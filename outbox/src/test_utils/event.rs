//! Helpers for seeding change log events in tests.

use chrono::{DateTime, Duration, Utc};

use crate::store::base::OutboxStore;
use crate::types::{EntityRef, EventId, EventType, NewEvent, RoutingDescriptor};

/// Shorthand for an entity reference.
pub fn entity(entity_name: &str, entity_id: impl ToString) -> EntityRef {
    EntityRef::new(entity_name, entity_id.to_string())
}

/// A fixed point in time to build deterministic event sequences from.
pub fn base_moment() -> DateTime<Utc> {
    Utc::now()
}

/// The moment `seconds` after `base`.
pub fn moment_after(base: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    base + Duration::seconds(seconds)
}

/// Appends one event to the store, panicking on failure.
pub async fn append_event<S>(
    store: &S,
    entity: EntityRef,
    event_type: EventType,
    routing: RoutingDescriptor,
    moment: DateTime<Utc>,
) -> EventId
where
    S: OutboxStore,
{
    store
        .append(NewEvent::new(entity, event_type, routing, moment))
        .await
        .expect("failed to append event")
}
