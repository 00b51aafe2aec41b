//! In-memory search destination for testing and development.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::destination::base::SearchDestination;
use crate::error::OutboxResult;
use crate::types::IndexOperation;

/// A document's position in the in-memory index.
///
/// `(entity_name, route, entity_id)`: the entity name doubles as the index
/// name and the route addresses the index partition the document lives in.
pub type DocumentKey = (String, Option<String>, String);

#[derive(Debug)]
struct Inner {
    documents: HashSet<DocumentKey>,
    operations: Vec<IndexOperation>,
}

/// In-memory implementation of [`SearchDestination`].
///
/// [`MemoryDestination`] keeps indexed documents as route-addressed keys and
/// records every applied operation, making it ideal for asserting on both the
/// final index state and the exact operations a pipeline dispatched. All data
/// is lost when the process terminates.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    /// Creates a new empty memory destination.
    pub fn new() -> Self {
        let inner = Inner {
            documents: HashSet::new(),
            operations: Vec::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns a copy of the indexed document keys.
    pub async fn documents(&self) -> HashSet<DocumentKey> {
        let inner = self.inner.lock().await;
        inner.documents.clone()
    }

    /// Whether a document is indexed at the given position.
    pub async fn contains(&self, entity_name: &str, route: Option<&str>, entity_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.documents.contains(&(
            entity_name.to_owned(),
            route.map(str::to_owned),
            entity_id.to_owned(),
        ))
    }

    /// Returns a copy of all operations applied to this destination, in order.
    pub async fn operations(&self) -> Vec<IndexOperation> {
        let inner = self.inner.lock().await;
        inner.operations.clone()
    }

    /// Number of indexed documents.
    pub async fn document_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.documents.len()
    }

    /// Clears all documents and recorded operations.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.documents.clear();
        inner.operations.clear();
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchDestination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn apply(&self, operation: &IndexOperation) -> OutboxResult<()> {
        let mut inner = self.inner.lock().await;

        info!("applying index operation: {}", operation);

        match operation {
            IndexOperation::Add { entity, route } => {
                inner.documents.insert((
                    entity.entity_name.clone(),
                    route.clone(),
                    entity.entity_id.clone(),
                ));
            }
            IndexOperation::AddOrUpdate {
                entity,
                route,
                stale_routes,
            } => {
                for stale in stale_routes {
                    inner.documents.remove(&(
                        entity.entity_name.clone(),
                        Some(stale.clone()),
                        entity.entity_id.clone(),
                    ));
                }
                inner.documents.insert((
                    entity.entity_name.clone(),
                    route.clone(),
                    entity.entity_id.clone(),
                ));
            }
            IndexOperation::Delete { entity, routes } => {
                for route in routes {
                    inner.documents.remove(&(
                        entity.entity_name.clone(),
                        route.clone(),
                        entity.entity_id.clone(),
                    ));
                }
            }
        }

        inner.operations.push(operation.clone());

        Ok(())
    }
}
