//! Writer-side accumulation of entity changes.
//!
//! Application code records entity changes into a [`ChangePlan`] over the
//! course of one logical transaction and commits the plan together with its
//! data changes. The plan collapses redundant changes before anything is
//! appended, so a row inserted and deleted in the same transaction never
//! produces an event at all.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::OutboxResult;
use crate::store::base::OutboxStore;
use crate::types::{EntityRef, EventId, EventType, NewEvent, RoutingDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetChange {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug)]
struct PlannedChange {
    change: NetChange,
    routing: RoutingDescriptor,
}

/// Accumulates the changes of one logical transaction and appends the net
/// events on commit.
///
/// Collapse rules per entity:
/// - add then update stays a plain add, the final state is still new
/// - add then delete cancels out entirely
/// - update then delete is a delete
/// - delete then add becomes an upsert, the entity was replaced
///
/// Routing is merged across calls: the latest current route wins, displaced
/// routes are kept as previous routes so the processor can retire them.
#[derive(Debug, Default)]
pub struct ChangePlan {
    order: Vec<EntityRef>,
    changes: HashMap<EntityRef, PlannedChange>,
}

impl ChangePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `entity` was created in this transaction.
    pub fn add(&mut self, entity: EntityRef, routing: RoutingDescriptor) {
        self.record(entity, EventType::Add, routing);
    }

    /// Records that `entity` was modified in this transaction.
    pub fn update(&mut self, entity: EntityRef, routing: RoutingDescriptor) {
        self.record(entity, EventType::AddOrUpdate, routing);
    }

    /// Records that `entity` was removed in this transaction.
    pub fn delete(&mut self, entity: EntityRef, routing: RoutingDescriptor) {
        self.record(entity, EventType::Delete, routing);
    }

    /// Returns whether the plan would append no events.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns how many events a commit would append.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Appends the net events to the change log, one per surviving entity,
    /// all stamped with the same moment.
    ///
    /// Call this inside the same database transaction as the data changes so
    /// the events become durable atomically with them. Returns the assigned
    /// event ids in entity first-seen order.
    pub async fn commit<S>(mut self, store: &S) -> OutboxResult<Vec<EventId>>
    where
        S: OutboxStore,
    {
        let moment = Utc::now();
        let mut event_ids = Vec::with_capacity(self.changes.len());

        for entity in self.order {
            let Some(planned) = self.changes.remove(&entity) else {
                continue;
            };

            let event_type = match planned.change {
                NetChange::Added => EventType::Add,
                NetChange::Updated => EventType::AddOrUpdate,
                NetChange::Deleted => EventType::Delete,
            };

            let event = NewEvent::new(entity, event_type, planned.routing, moment);
            event_ids.push(store.append(event).await?);
        }

        Ok(event_ids)
    }

    fn record(&mut self, entity: EntityRef, incoming: EventType, routing: RoutingDescriptor) {
        let Some(existing) = self.changes.remove(&entity) else {
            let change = match incoming {
                EventType::Add => NetChange::Added,
                EventType::AddOrUpdate => NetChange::Updated,
                EventType::Delete => NetChange::Deleted,
            };

            if !self.order.contains(&entity) {
                self.order.push(entity.clone());
            }
            self.changes.insert(entity, PlannedChange { change, routing });

            return;
        };

        let change = match (existing.change, incoming) {
            // The entity is still new to observers outside this transaction.
            (NetChange::Added, EventType::Add | EventType::AddOrUpdate) => NetChange::Added,
            // Created and removed within the transaction, net nothing.
            (NetChange::Added, EventType::Delete) => {
                return;
            }
            (NetChange::Updated, EventType::Add | EventType::AddOrUpdate) => NetChange::Updated,
            (NetChange::Updated, EventType::Delete) => NetChange::Deleted,
            // Removed and recreated, observers may hold either version.
            (NetChange::Deleted, EventType::Add | EventType::AddOrUpdate) => NetChange::Updated,
            (NetChange::Deleted, EventType::Delete) => NetChange::Deleted,
        };

        let routing = merge_routing(existing.routing, routing);
        self.changes.insert(entity, PlannedChange { change, routing });
    }
}

/// Merges two routing descriptors recorded for the same entity.
///
/// The newer current route wins; an older current route that got displaced
/// joins the previous routes. Previous routes never contain the current one.
fn merge_routing(older: RoutingDescriptor, newer: RoutingDescriptor) -> RoutingDescriptor {
    let current_route = newer.current_route;

    let mut previous_routes = Vec::new();
    let mut push = |route: String| {
        if current_route.as_deref() != Some(route.as_str()) && !previous_routes.contains(&route) {
            previous_routes.push(route);
        }
    };

    for route in older.previous_routes {
        push(route);
    }
    if let Some(displaced) = older.current_route {
        push(displaced);
    }
    for route in newer.previous_routes {
        push(route);
    }

    RoutingDescriptor {
        current_route,
        previous_routes,
    }
}
