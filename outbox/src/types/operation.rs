//! Merged index operations dispatched to the search backend.

use std::fmt;

use crate::types::EntityRef;

/// The net work for one entity after merging a fetched batch.
///
/// Operations carry the entity identity and final routing information only; the
/// mapping from entity to document fields is owned by the backend integration.
/// Backends must treat [`IndexOperation::AddOrUpdate`] and deletes of absent
/// documents as idempotent, since rows left behind by a mid-cycle shutdown are
/// redelivered on the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOperation {
    /// Adds a freshly-created entity to the index at the given route.
    Add {
        entity: EntityRef,
        route: Option<String>,
    },
    /// Adds or updates the entity at `route` and retires every stale route.
    ///
    /// Deleting the stale routes and upserting at the current route may happen
    /// in either order, but both must complete before the batch is committed.
    AddOrUpdate {
        entity: EntityRef,
        route: Option<String>,
        stale_routes: Vec<String>,
    },
    /// Deletes the entity from every route it may still be indexed under.
    Delete {
        entity: EntityRef,
        routes: Vec<Option<String>>,
    },
}

impl IndexOperation {
    /// The entity this operation applies to.
    pub fn entity(&self) -> &EntityRef {
        match self {
            IndexOperation::Add { entity, .. }
            | IndexOperation::AddOrUpdate { entity, .. }
            | IndexOperation::Delete { entity, .. } => entity,
        }
    }
}

impl fmt::Display for IndexOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn route_name(route: &Option<String>) -> &str {
            route.as_deref().unwrap_or("<unrouted>")
        }

        match self {
            IndexOperation::Add { entity, route } => {
                write!(f, "add {} at route {}", entity, route_name(route))
            }
            IndexOperation::AddOrUpdate {
                entity,
                route,
                stale_routes,
            } => {
                write!(
                    f,
                    "add-or-update {} at route {}",
                    entity,
                    route_name(route)
                )?;
                if !stale_routes.is_empty() {
                    write!(f, " retiring routes [{}]", stale_routes.join(", "))?;
                }
                Ok(())
            }
            IndexOperation::Delete { entity, routes } => {
                let routes = routes
                    .iter()
                    .map(|route| route_name(route).to_owned())
                    .collect::<Vec<_>>();
                write!(f, "delete {} from routes [{}]", entity, routes.join(", "))
            }
        }
    }
}
