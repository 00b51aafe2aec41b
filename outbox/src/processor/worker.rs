//! Polling worker that drains the change log into the search backend.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{Instrument, debug, error, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::concurrency::signal::SignalRx;
use crate::config::PipelineConfig;
use crate::destination::SearchDestination;
use crate::error::{ErrorKind, OutboxError, OutboxResult};
use crate::failure::{FailureHandler, FailureKind, FailureReport};
use crate::metrics::{
    DESTINATION_LABEL, OUTBOX_BATCHES_TOTAL, OUTBOX_DISPATCH_FAILURES_TOTAL,
    OUTBOX_EVENTS_FETCHED_TOTAL, OUTBOX_EVENTS_LOST_TOTAL, OUTBOX_EVENTS_PROCESSED_TOTAL,
    PIPELINE_ID_LABEL, ProcessorMetrics,
};
use crate::outbox_error;
use crate::pipeline::PipelineId;
use crate::processor::merge::{MergedWork, merge_events};
use crate::processor::retry::RetryPolicy;
use crate::shard::ShardPartitioner;
use crate::store::base::OutboxStore;
use crate::store::filter::EventFilter;
use crate::types::EventId;

/// Outcome of one polling cycle.
enum CycleOutcome {
    Continue,
    Shutdown,
}

/// Outcome of dispatching one merged operation, retries included.
enum DispatchOutcome {
    Completed,
    Shutdown,
}

/// Handle for monitoring the processor worker.
///
/// Enables waiting for worker completion and surfaces panics or cancellation
/// as errors.
#[derive(Debug)]
pub struct ProcessorWorkerHandle {
    handle: Option<JoinHandle<OutboxResult<()>>>,
}

impl ProcessorWorkerHandle {
    /// Waits for the processor worker to complete execution.
    pub async fn wait(mut self) -> OutboxResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            if err.is_cancelled() {
                outbox_error!(
                    ErrorKind::ProcessorWorkerCancelled,
                    "Processor worker was cancelled",
                    err
                )
            } else {
                outbox_error!(
                    ErrorKind::ProcessorWorkerPanic,
                    "Processor worker panicked",
                    err
                )
            }
        })??;

        Ok(())
    }
}

/// Worker that periodically fetches pending events for this node's shards,
/// merges them, and dispatches the net operations to the search backend.
///
/// One worker runs per pipeline. Exactly-once processing across nodes comes
/// from the shard filter alone: every fetched row belongs to a shard this
/// node owns, so no other node ever sees it.
#[derive(Debug)]
pub struct ProcessorWorker<S, D> {
    pipeline_id: PipelineId,
    config: Arc<PipelineConfig>,
    store: S,
    destination: D,
    partitioner: ShardPartitioner,
    failure_handler: Arc<dyn FailureHandler>,
    metrics: ProcessorMetrics,
    retry_policy: RetryPolicy,
    shutdown_rx: ShutdownRx,
    process_now_rx: SignalRx,
}

impl<S, D> ProcessorWorker<S, D> {
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        pipeline_id: PipelineId,
        config: Arc<PipelineConfig>,
        store: S,
        destination: D,
        partitioner: ShardPartitioner,
        failure_handler: Arc<dyn FailureHandler>,
        metrics: ProcessorMetrics,
        shutdown_rx: ShutdownRx,
        process_now_rx: SignalRx,
    ) -> Self {
        let retry_policy = RetryPolicy::new(
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
        );

        Self {
            pipeline_id,
            config,
            store,
            destination,
            partitioner,
            failure_handler,
            metrics,
            retry_policy,
            shutdown_rx,
            process_now_rx,
        }
    }
}

impl<S, D> ProcessorWorker<S, D>
where
    S: OutboxStore + Send + Sync + 'static,
    D: SearchDestination + Send + Sync + 'static,
{
    /// Spawns the processor worker and returns a handle for monitoring.
    pub async fn spawn(self) -> OutboxResult<ProcessorWorkerHandle> {
        info!("starting processor worker");

        let processor_worker_span = tracing::info_span!(
            "processor_worker",
            pipeline_id = self.pipeline_id,
            destination = D::name()
        );
        let processor_worker = async move {
            self.run().await?;

            info!("processor worker completed successfully");

            Ok(())
        }
        .instrument(processor_worker_span.or_current());

        let handle = tokio::spawn(processor_worker);

        Ok(ProcessorWorkerHandle {
            handle: Some(handle),
        })
    }

    async fn run(mut self) -> OutboxResult<()> {
        let shard_filter = self.partitioner.filter();

        let mut poll_interval =
            time::interval(Duration::from_millis(self.config.batch.poll_interval_ms));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.signaled() => {
                    info!("shutting down processor worker");

                    return Ok(());
                }
                _ = poll_interval.tick() => {}
                result = self.process_now_rx.changed() => {
                    if result.is_err() {
                        info!("pipeline handle dropped, shutting down processor worker");

                        return Ok(());
                    }

                    debug!("immediate processing cycle requested");
                }
            }

            if let CycleOutcome::Shutdown = self.run_cycle(&shard_filter).await {
                info!("shutting down processor worker");

                return Ok(());
            }
        }
    }

    /// Runs one fetch-merge-dispatch cycle.
    ///
    /// Fetch errors are logged and swallowed so that a store hiccup only
    /// delays processing until the next tick.
    async fn run_cycle(&mut self, shard_filter: &dyn EventFilter) -> CycleOutcome {
        let events = match self
            .store
            .find_batch(self.config.batch.max_size, shard_filter)
            .await
        {
            Ok(events) => events,
            Err(err) => {
                error!(error = %err, "failed to fetch pending events from the change log");

                return CycleOutcome::Continue;
            }
        };

        if events.is_empty() {
            return CycleOutcome::Continue;
        }

        debug!(batch_size = events.len(), "fetched pending events");
        self.metrics.record_batch(events.len());
        counter!(
            OUTBOX_BATCHES_TOTAL,
            PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
            DESTINATION_LABEL => D::name()
        )
        .increment(1);
        counter!(
            OUTBOX_EVENTS_FETCHED_TOTAL,
            PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
            DESTINATION_LABEL => D::name()
        )
        .increment(events.len() as u64);

        for work in merge_events(&events) {
            if let DispatchOutcome::Shutdown = self.dispatch_with_retry(work).await {
                return CycleOutcome::Shutdown;
            }
        }

        CycleOutcome::Continue
    }

    /// Dispatches one merged operation, retrying with backoff on failure.
    ///
    /// The failure counter is seeded from the persisted retry count of the
    /// merged rows, so the budget spans restarts. When the budget runs out
    /// the rows are removed anyway; a terminally failing event must not block
    /// its shard forever.
    async fn dispatch_with_retry(&mut self, work: MergedWork) -> DispatchOutcome {
        let mut failed_attempts = work.retry_count.max(0) as u32;

        loop {
            match self.destination.apply(&work.operation).await {
                Ok(()) => {
                    self.metrics.record_processed(work.event_ids.len());
                    counter!(
                        OUTBOX_EVENTS_PROCESSED_TOTAL,
                        PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
                        DESTINATION_LABEL => D::name()
                    )
                    .increment(work.event_ids.len() as u64);
                    self.commit(&work.event_ids).await;

                    return DispatchOutcome::Completed;
                }
                Err(err) => {
                    self.metrics.record_dispatch_failure();
                    counter!(
                        OUTBOX_DISPATCH_FAILURES_TOTAL,
                        PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
                        DESTINATION_LABEL => D::name()
                    )
                    .increment(1);

                    if self.retry_policy.is_exhausted(failed_attempts) {
                        self.report_failure(&work, err, FailureKind::RetriesExhausted);
                        self.metrics.record_lost(work.event_ids.len());
                        counter!(
                            OUTBOX_EVENTS_LOST_TOTAL,
                            PIPELINE_ID_LABEL => self.pipeline_id.to_string(),
                            DESTINATION_LABEL => D::name()
                        )
                        .increment(work.event_ids.len() as u64);
                        self.commit(&work.event_ids).await;

                        return DispatchOutcome::Completed;
                    }

                    failed_attempts += 1;
                    self.report_failure(&work, err, FailureKind::Transient);

                    if let Err(err) = self.store.increment_retry_count(&work.event_ids).await {
                        error!(error = %err, "failed to persist the retry count");
                    }

                    let delay = self.retry_policy.backoff_delay(failed_attempts);
                    tokio::select! {
                        _ = self.shutdown_rx.signaled() => return DispatchOutcome::Shutdown,
                        _ = time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Removes processed rows from the change log.
    ///
    /// A failed delete is logged and skipped; the rows stay behind and are
    /// redelivered on a later cycle, which index operations tolerate since
    /// they are idempotent upserts and deletes.
    async fn commit(&self, event_ids: &[EventId]) {
        if let Err(err) = self.store.delete_events(event_ids).await {
            error!(error = %err, "failed to remove processed events from the change log");
        }
    }

    fn report_failure(&self, work: &MergedWork, error: OutboxError, kind: FailureKind) {
        let report = FailureReport {
            operation: work.operation.to_string(),
            error,
            entities: vec![work.operation.entity().clone()],
            kind,
        };

        self.failure_handler.handle(&report);
    }
}
