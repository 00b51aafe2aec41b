//! Change log store contract.

use std::future::Future;

use crate::error::OutboxResult;
use crate::store::filter::EventFilter;
use crate::types::{EventId, NewEvent, OutboxEvent};

/// Durable, append-only change log consumed by the batch processor.
///
/// Rows are never mutated in place except for bumping the retry count, and
/// removal happens only after the corresponding work reached the backend or
/// exhausted its retries. Both mutations must be atomic with respect to the
/// read that produced the batch: a node killed between a fetch and the final
/// delete simply leaves rows behind for the next run.
///
/// `find_batch` is read-only. Concurrent fetch exclusivity within one node is
/// the processor's responsibility; across nodes the shard filter guarantees
/// that no two correctly-configured nodes ever read the same rows.
pub trait OutboxStore {
    /// Appends one event to the change log and returns its assigned id.
    ///
    /// Writers call this exactly once per affected entity per committing
    /// transaction, after collapsing intra-transaction mutations into the net
    /// effect.
    fn append(&self, event: NewEvent) -> impl Future<Output = OutboxResult<EventId>> + Send;

    /// Returns the next batch of pending events matching `filter`.
    ///
    /// Events are ordered by `(moment, id)` ascending and limited to
    /// `max_results`. The call has no side effects.
    fn find_batch(
        &self,
        max_results: usize,
        filter: &dyn EventFilter,
    ) -> impl Future<Output = OutboxResult<Vec<OutboxEvent>>> + Send;

    /// Removes processed rows, returning how many were deleted.
    fn delete_events(&self, ids: &[EventId]) -> impl Future<Output = OutboxResult<u64>> + Send;

    /// Increments the retry count of the given rows by one.
    ///
    /// This is the only in-place mutation the change log supports.
    fn increment_retry_count(
        &self,
        ids: &[EventId],
    ) -> impl Future<Output = OutboxResult<()>> + Send;
}
