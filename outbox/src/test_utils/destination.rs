//! Destination wrappers for failure injection in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::destination::SearchDestination;
use crate::destination::memory::MemoryDestination;
use crate::error::{ErrorKind, OutboxResult};
use crate::outbox_error;
use crate::types::{EntityRef, IndexOperation};

#[derive(Debug, Default)]
struct FlakyState {
    failures_left: HashMap<EntityRef, u32>,
    always_fail: HashSet<EntityRef>,
    attempts: HashMap<EntityRef, u32>,
}

/// Destination that fails a configurable number of times per entity before
/// delegating to an in-memory destination.
///
/// Clones share the failure schedule and the attempt counters.
#[derive(Debug, Clone)]
pub struct FlakyDestination {
    inner: MemoryDestination,
    state: Arc<Mutex<FlakyState>>,
}

impl FlakyDestination {
    pub fn wrap(inner: MemoryDestination) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(FlakyState::default())),
        }
    }

    /// Makes the next `failures` operations touching `entity` fail.
    pub async fn fail_times(&self, entity: EntityRef, failures: u32) {
        self.state.lock().await.failures_left.insert(entity, failures);
    }

    /// Makes every operation touching `entity` fail.
    pub async fn fail_always(&self, entity: EntityRef) {
        self.state.lock().await.always_fail.insert(entity);
    }

    /// Returns how many operations touched `entity`, failed ones included.
    pub async fn attempts(&self, entity: &EntityRef) -> u32 {
        self.state
            .lock()
            .await
            .attempts
            .get(entity)
            .copied()
            .unwrap_or(0)
    }

    /// The wrapped destination holding the successfully applied operations.
    pub fn inner(&self) -> &MemoryDestination {
        &self.inner
    }
}

impl SearchDestination for FlakyDestination {
    fn name() -> &'static str {
        "flaky-memory"
    }

    async fn apply(&self, operation: &IndexOperation) -> OutboxResult<()> {
        let entity = operation.entity().clone();

        {
            let mut state = self.state.lock().await;
            *state.attempts.entry(entity.clone()).or_insert(0) += 1;

            if state.always_fail.contains(&entity) {
                return Err(outbox_error!(
                    ErrorKind::DestinationError,
                    "Injected permanent failure",
                    format!("entity {entity}")
                ));
            }

            if let Some(failures_left) = state.failures_left.get_mut(&entity)
                && *failures_left > 0
            {
                *failures_left -= 1;

                return Err(outbox_error!(
                    ErrorKind::DestinationError,
                    "Injected transient failure",
                    format!("entity {entity}")
                ));
            }
        }

        self.inner.apply(operation).await
    }
}
