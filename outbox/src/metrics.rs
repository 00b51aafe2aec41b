//! Metrics definitions and per-pipeline counters.
//!
//! Two layers of observability: exported counters through the `metrics` facade
//! for operators, and a [`ProcessorMetrics`] context object carried by the
//! processing loop so that callers and tests can read exact counts without any
//! process-global state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Label for pipeline ID in metrics.
pub const PIPELINE_ID_LABEL: &str = "pipeline_id";

/// Label for the destination name in metrics.
pub const DESTINATION_LABEL: &str = "destination";

/// Counter for polling cycles that fetched at least one event.
pub const OUTBOX_BATCHES_TOTAL: &str = "outbox_batches_total";

/// Counter for events fetched from the change log.
pub const OUTBOX_EVENTS_FETCHED_TOTAL: &str = "outbox_events_fetched_total";

/// Counter for events processed and removed from the change log.
pub const OUTBOX_EVENTS_PROCESSED_TOTAL: &str = "outbox_events_processed_total";

/// Counter for failed dispatch attempts.
pub const OUTBOX_DISPATCH_FAILURES_TOTAL: &str = "outbox_dispatch_failures_total";

/// Counter for events dropped after exhausting retries.
pub const OUTBOX_EVENTS_LOST_TOTAL: &str = "outbox_events_lost_total";

#[derive(Debug, Default)]
struct Counters {
    batches: AtomicU64,
    events_fetched: AtomicU64,
    events_processed: AtomicU64,
    dispatch_failures: AtomicU64,
    events_lost: AtomicU64,
}

/// Shared counters for one pipeline's processing loop.
///
/// Cheap to clone; all clones observe the same counts.
#[derive(Debug, Clone, Default)]
pub struct ProcessorMetrics {
    counters: Arc<Counters>,
}

/// Point-in-time copy of a pipeline's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Polling cycles that fetched at least one event.
    pub batches: u64,
    /// Events fetched from the change log.
    pub events_fetched: u64,
    /// Events processed and removed from the change log.
    pub events_processed: u64,
    /// Failed dispatch attempts, including the final exhausting one.
    pub dispatch_failures: u64,
    /// Events dropped after exhausting retries.
    pub events_lost: u64,
}

impl ProcessorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_batch(&self, fetched: usize) {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .events_fetched
            .fetch_add(fetched as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self, events: usize) {
        self.counters
            .events_processed
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_failure(&self) {
        self.counters
            .dispatch_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lost(&self, events: usize) {
        self.counters
            .events_lost
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    /// Reads all counters at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.counters.batches.load(Ordering::Relaxed),
            events_fetched: self.counters.events_fetched.load(Ordering::Relaxed),
            events_processed: self.counters.events_processed.load(Ordering::Relaxed),
            dispatch_failures: self.counters.dispatch_failures.load(Ordering::Relaxed),
            events_lost: self.counters.events_lost.load(Ordering::Relaxed),
        }
    }
}
