//! Merging of redundant change log events.
//!
//! Within one fetched batch, several events may exist for the same entity
//! because separate transactions each appended their own row. Only the
//! logically final effect is dispatched: a later delete cancels an earlier
//! add, a later update supersedes an earlier one, and routing changes are
//! collapsed so that intermediate routes are retired without ever being
//! indexed. Events arrive from the finder in `(moment, id)` order, which is
//! the causal order even when ids were renumbered out of sequence.

use std::collections::HashMap;

use tracing::warn;

use crate::types::{
    EntityRef, EventId, EventType, IndexOperation, OutboxEvent, RoutingDescriptor,
};

/// The net work for one entity after merging, together with the rows it
/// replaces and the retry budget already consumed by those rows.
#[derive(Debug, Clone)]
pub struct MergedWork {
    pub operation: IndexOperation,
    pub event_ids: Vec<EventId>,
    pub retry_count: i32,
}

/// Per-entity fold state while scanning a batch.
#[derive(Debug)]
struct EntityFold {
    entity: EntityRef,
    event_ids: Vec<EventId>,
    retry_count: i32,
    event_count: usize,
    last_type: EventType,
    current_route: Option<String>,
    stale_routes: Vec<String>,
}

impl EntityFold {
    fn start(event: &OutboxEvent, routing: RoutingDescriptor) -> Self {
        let mut fold = Self {
            entity: event.entity.clone(),
            event_ids: Vec::new(),
            retry_count: 0,
            event_count: 0,
            last_type: event.event_type,
            current_route: None,
            stale_routes: Vec::new(),
        };
        fold.absorb(event, routing);
        fold
    }

    fn absorb(&mut self, event: &OutboxEvent, routing: RoutingDescriptor) {
        // A displaced current route becomes stale unless the event kept it.
        let displaced = std::mem::replace(&mut self.current_route, routing.current_route);
        if let Some(displaced) = displaced
            && self.current_route.as_deref() != Some(displaced.as_str())
        {
            self.push_stale(displaced);
        }

        for route in routing.previous_routes {
            self.push_stale(route);
        }

        self.last_type = event.event_type;
        self.event_ids.push(event.id);
        self.retry_count = self.retry_count.max(event.retry_count);
        self.event_count += 1;
    }

    fn push_stale(&mut self, route: String) {
        if !self.stale_routes.contains(&route) {
            self.stale_routes.push(route);
        }
    }

    fn finish(self) -> MergedWork {
        // Routes the entity is no longer indexed under. A route that ended up
        // current again (A -> B -> A) is not stale.
        let stale_routes = self
            .stale_routes
            .into_iter()
            .filter(|route| self.current_route.as_deref() != Some(route.as_str()))
            .collect::<Vec<_>>();

        let operation = match self.last_type {
            EventType::Delete => {
                let mut routes = vec![self.current_route];
                for route in stale_routes {
                    let route = Some(route);
                    if !routes.contains(&route) {
                        routes.push(route);
                    }
                }

                IndexOperation::Delete {
                    entity: self.entity,
                    routes,
                }
            }
            // A lone add stays an add; an add merged with earlier events, in
            // particular a delete-then-recreate observed out of id order, must
            // converge to an idempotent upsert instead.
            EventType::Add if self.event_count == 1 && stale_routes.is_empty() => {
                IndexOperation::Add {
                    entity: self.entity,
                    route: self.current_route,
                }
            }
            EventType::Add | EventType::AddOrUpdate => IndexOperation::AddOrUpdate {
                entity: self.entity,
                route: self.current_route,
                stale_routes,
            },
        };

        MergedWork {
            operation,
            event_ids: self.event_ids,
            retry_count: self.retry_count,
        }
    }
}

/// Collapses a fetched batch into one [`MergedWork`] per entity.
///
/// The batch must already be in `(moment, id)` order, as returned by the
/// finder. Output preserves the order in which entities first appear. An
/// undecodable routing payload degrades to the default descriptor rather than
/// poisoning the batch; the condition is logged since it points at a corrupt
/// writer.
pub fn merge_events(events: &[OutboxEvent]) -> Vec<MergedWork> {
    let mut order = Vec::new();
    let mut folds: HashMap<EntityRef, EntityFold> = HashMap::new();

    for event in events {
        let routing = match event.routing() {
            Ok(routing) => routing,
            Err(err) => {
                warn!(
                    event_id = event.id,
                    entity = %event.entity,
                    error = %err,
                    "event carries an undecodable routing payload, assuming no routing"
                );

                RoutingDescriptor::default()
            }
        };

        match folds.get_mut(&event.entity) {
            Some(fold) => fold.absorb(event, routing),
            None => {
                order.push(event.entity.clone());
                folds.insert(event.entity.clone(), EntityFold::start(event, routing));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|entity| folds.remove(&entity))
        .map(EntityFold::finish)
        .collect()
}
