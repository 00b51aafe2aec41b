//! Change log event model.
//!
//! An [`OutboxEvent`] is one durable row of the change log: the net effect of one
//! committed transaction on one entity. Rows are immutable once appended, except
//! for the retry count which tracks failed dispatch attempts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OutboxResult;

/// Identifier of a change log row, monotonically assigned by the store.
///
/// Ids are the tie-breaking ordering key after the creation timestamp. They are
/// not guaranteed to stay temporally ordered forever (external tooling may
/// renumber rows), so processing logic orders by `(moment, id)` and tolerates
/// id order diverging from causal order for a single entity.
pub type EventId = i64;

/// Identity of a domain entity, the unit of event merging.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    /// Logical name of the source type, which doubles as the index name.
    pub entity_name: String,
    /// String form of the entity's identifier.
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_name: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_name, self.entity_id)
    }
}

/// Net effect of a committed transaction on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// The entity was created and must be added to the index.
    Add,
    /// The entity must be added or updated in the index, whichever applies.
    AddOrUpdate,
    /// The entity was removed and must be deleted from the index.
    Delete,
}

impl EventType {
    /// Wire representation used by the Postgres store.
    pub fn as_i16(&self) -> i16 {
        match self {
            EventType::Add => 0,
            EventType::AddOrUpdate => 1,
            EventType::Delete => 2,
        }
    }

    /// Decodes the wire representation, returning `None` for unknown codes.
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(EventType::Add),
            1 => Some(EventType::AddOrUpdate),
            2 => Some(EventType::Delete),
            _ => None,
        }
    }
}

/// Routing information carried in the opaque event payload.
///
/// `current_route` is the routing key the document belongs to now, or `None`
/// for unrouted indexes. `previous_routes` is the ordered, duplicate-free list
/// of routing keys the document was previously indexed under and which have not
/// been retired yet. When processed, every stale route produces a compensating
/// delete in addition to the operation at the current route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDescriptor {
    pub current_route: Option<String>,
    #[serde(default)]
    pub previous_routes: Vec<String>,
}

impl RoutingDescriptor {
    /// Descriptor for an entity indexed at a single route with no pending retirements.
    pub fn route(current_route: impl Into<String>) -> Self {
        Self {
            current_route: Some(current_route.into()),
            previous_routes: Vec::new(),
        }
    }

    /// Descriptor for an unrouted entity.
    pub fn unrouted() -> Self {
        Self::default()
    }

    /// Adds a previously-used route pending retirement, keeping the list duplicate-free.
    pub fn with_previous_route(mut self, route: impl Into<String>) -> Self {
        let route = route.into();
        if !self.previous_routes.contains(&route) {
            self.previous_routes.push(route);
        }
        self
    }

    /// Serializes the descriptor into the opaque payload bytes of an event.
    pub fn to_payload(&self) -> OutboxResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes a descriptor from payload bytes.
    ///
    /// An empty payload decodes to the default descriptor so that events written
    /// without routing information stay processable.
    pub fn from_payload(payload: &[u8]) -> OutboxResult<Self> {
        if payload.is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_json::from_slice(payload)?)
    }
}

/// Computes the stable partition hash of an entity.
///
/// FNV-1a over `entity_name` and `entity_id` with a separator byte. The hash
/// must be identical across processes and releases since disjoint nodes rely on
/// it to claim disjoint events, so this must never be replaced with a
/// randomly-seeded hasher. The 32-bit value is widened to `i64` to keep the
/// stored column and the SQL modulo arithmetic non-negative.
pub fn entity_partition_hash(entity_name: &str, entity_id: &str) -> i64 {
    const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in entity_name
        .as_bytes()
        .iter()
        .chain([0u8].iter())
        .chain(entity_id.as_bytes().iter())
    {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    i64::from(hash)
}

/// A change log row as returned by the finder.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    /// Monotonically-assigned primary key, secondary ordering key.
    pub id: EventId,
    /// Identity of the affected entity.
    pub entity: EntityRef,
    /// Stable partition hash of the entity, computed at enqueue time.
    pub entity_hash: i64,
    /// Net effect of the originating transaction.
    pub event_type: EventType,
    /// Opaque payload carrying the routing descriptor.
    pub payload: Vec<u8>,
    /// Creation timestamp, the primary ordering key.
    pub moment: DateTime<Utc>,
    /// Dispatch attempts already failed for this row.
    pub retry_count: i32,
}

impl OutboxEvent {
    /// Decodes the routing descriptor from the event payload.
    pub fn routing(&self) -> OutboxResult<RoutingDescriptor> {
        RoutingDescriptor::from_payload(&self.payload)
    }
}

/// A writer-side event draft, not yet assigned an id by the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub entity: EntityRef,
    pub event_type: EventType,
    pub routing: RoutingDescriptor,
    pub moment: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(
        entity: EntityRef,
        event_type: EventType,
        routing: RoutingDescriptor,
        moment: DateTime<Utc>,
    ) -> Self {
        Self {
            entity,
            event_type,
            routing,
            moment,
        }
    }

    /// Partition hash of the drafted entity.
    pub fn entity_hash(&self) -> i64 {
        entity_partition_hash(&self.entity.entity_name, &self.entity.entity_id)
    }

    /// Serialized payload for the drafted event.
    pub fn payload(&self) -> OutboxResult<Vec<u8>> {
        self.routing.to_payload()
    }
}
