//! In-memory change log store for testing and development.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::OutboxResult;
use crate::store::base::OutboxStore;
use crate::store::filter::EventFilter;
use crate::types::{EventId, NewEvent, OutboxEvent};

#[derive(Debug)]
struct Inner {
    events: Vec<OutboxEvent>,
    next_id: EventId,
}

/// In-memory implementation of [`OutboxStore`].
///
/// [`MemoryStore`] keeps all change log rows in memory behind a mutex and
/// assigns ids from a local counter. Clones share the same underlying log,
/// which lets tests run several pipelines against one log the way several
/// nodes would share one database table. All data is lost when the process
/// terminates.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    pub fn new() -> Self {
        let inner = Inner {
            events: Vec::new(),
            next_id: 1,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns a snapshot of all pending events, in `(moment, id)` order.
    pub async fn events(&self) -> Vec<OutboxEvent> {
        let inner = self.inner.lock().await;

        let mut events = inner.events.clone();
        events.sort_by(|a, b| (a.moment, a.id).cmp(&(b.moment, b.id)));
        events
    }

    /// Returns the number of pending rows.
    pub async fn pending_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.events.len()
    }

    /// Swaps the ids of two pending rows.
    ///
    /// Models external tooling renumbering change log rows, which is why id
    /// order cannot be trusted to match causal order. Only useful in tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn swap_event_ids(&self, first: EventId, second: EventId) {
        let mut inner = self.inner.lock().await;

        for event in inner.events.iter_mut() {
            if event.id == first {
                event.id = second;
            } else if event.id == second {
                event.id = first;
            }
        }
    }

    /// Overwrites the payload of a pending row with undecodable bytes.
    ///
    /// Models a buggy or foreign writer having appended garbage. Only useful
    /// in tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn corrupt_payload(&self, id: EventId) {
        let mut inner = self.inner.lock().await;

        for event in inner.events.iter_mut() {
            if event.id == id {
                event.payload = b"not a payload".to_vec();
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxStore for MemoryStore {
    async fn append(&self, event: NewEvent) -> OutboxResult<EventId> {
        let entity_hash = event.entity_hash();
        let payload = event.payload()?;

        let mut inner = self.inner.lock().await;

        let id = inner.next_id;
        inner.next_id += 1;

        inner.events.push(OutboxEvent {
            id,
            entity: event.entity,
            entity_hash,
            event_type: event.event_type,
            payload,
            moment: event.moment,
            retry_count: 0,
        });

        Ok(id)
    }

    async fn find_batch(
        &self,
        max_results: usize,
        filter: &dyn EventFilter,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let inner = self.inner.lock().await;

        let mut matching = inner
            .events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| (a.moment, a.id).cmp(&(b.moment, b.id)));
        matching.truncate(max_results);

        Ok(matching)
    }

    async fn delete_events(&self, ids: &[EventId]) -> OutboxResult<u64> {
        let mut inner = self.inner.lock().await;

        let before = inner.events.len();
        inner.events.retain(|event| !ids.contains(&event.id));

        Ok((before - inner.events.len()) as u64)
    }

    async fn increment_retry_count(&self, ids: &[EventId]) -> OutboxResult<()> {
        let mut inner = self.inner.lock().await;

        for event in inner.events.iter_mut() {
            if ids.contains(&event.id) {
                event.retry_count += 1;
            }
        }

        Ok(())
    }
}
