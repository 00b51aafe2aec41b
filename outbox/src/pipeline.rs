//! Pipeline orchestration for outbox processing.

use std::sync::Arc;

use tracing::{error, info};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::concurrency::signal::{SignalTx, create_signal};
use crate::config::PipelineConfig;
use crate::destination::SearchDestination;
use crate::error::{ErrorKind, OutboxResult};
use crate::failure::{FailureHandler, LogFailureHandler};
use crate::metrics::{MetricsSnapshot, ProcessorMetrics};
use crate::outbox_error;
use crate::processor::worker::{ProcessorWorker, ProcessorWorkerHandle};
use crate::shard::ShardPartitioner;
use crate::store::base::OutboxStore;

/// Unique identifier for a pipeline.
pub type PipelineId = u64;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        worker: Option<ProcessorWorkerHandle>,
    },
}

/// Synchronization pipeline binding a change log store to a search backend.
///
/// A pipeline owns one processor worker which polls the store for events on
/// this node's shards and dispatches the merged index operations to the
/// destination. Nodes that claim no shards, or that run with processing
/// disabled, start successfully but never poll; they only feed the log
/// through their writers.
///
/// Configuration is validated when the pipeline starts, so misconfiguration
/// fails fast instead of surfacing as skipped events at runtime.
#[derive(Debug)]
pub struct Pipeline<S, D> {
    id: PipelineId,
    config: Arc<PipelineConfig>,
    store: S,
    destination: D,
    failure_handler: Arc<dyn FailureHandler>,
    metrics: ProcessorMetrics,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
    process_now_tx: SignalTx,
}

impl<S, D> Pipeline<S, D>
where
    S: OutboxStore + Clone + Send + Sync + 'static,
    D: SearchDestination + Clone + Send + Sync + 'static,
{
    /// Creates a new pipeline with the given configuration and dependencies.
    ///
    /// Failures are reported through [`LogFailureHandler`] unless replaced
    /// with [`Pipeline::with_failure_handler`].
    pub fn new(config: PipelineConfig, store: S, destination: D) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();
        let (process_now_tx, _) = create_signal();

        Self {
            id: config.id,
            config: Arc::new(config),
            store,
            destination,
            failure_handler: Arc::new(LogFailureHandler),
            metrics: ProcessorMetrics::new(),
            state: PipelineState::NotStarted,
            shutdown_tx,
            process_now_tx,
        }
    }

    /// Replaces the failure handler that receives dispatch failure reports.
    pub fn with_failure_handler(mut self, failure_handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = failure_handler;
        self
    }

    /// Returns the identifier of this pipeline.
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns the live counters of this pipeline's processing loop.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns a clone of the shutdown transmitter.
    ///
    /// Lets external code, for example a signal handler, request shutdown
    /// without holding the pipeline itself.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Validates the configuration and spawns the processor worker.
    pub async fn start(&mut self) -> OutboxResult<()> {
        if matches!(self.state, PipelineState::Started { .. }) {
            bail!(ErrorKind::InvalidState, "Pipeline already started");
        }

        info!(pipeline_id = self.id, "starting outbox pipeline");

        self.config.validate().map_err(|err| {
            outbox_error!(
                ErrorKind::ConfigError,
                "Invalid pipeline configuration",
                err
            )
        })?;
        let partitioner = ShardPartitioner::new(&self.config.shards)?;

        if !self.config.processing.enabled {
            info!("event processing is disabled, this node will not poll the change log");
            self.state = PipelineState::Started { worker: None };

            return Ok(());
        }

        if !partitioner.claims_any() {
            info!("no shards assigned, this node will not poll the change log");
            self.state = PipelineState::Started { worker: None };

            return Ok(());
        }

        let worker = ProcessorWorker::new(
            self.id,
            self.config.clone(),
            self.store.clone(),
            self.destination.clone(),
            partitioner,
            self.failure_handler.clone(),
            self.metrics.clone(),
            self.shutdown_tx.subscribe(),
            self.process_now_tx.subscribe(),
        )
        .spawn()
        .await?;

        self.state = PipelineState::Started {
            worker: Some(worker),
        };

        Ok(())
    }

    /// Requests an immediate processing cycle instead of waiting for the next
    /// scheduled tick.
    ///
    /// Sends while no cycle is pending coalesce into a single wakeup. A no-op
    /// on nodes without a processor worker.
    pub fn process_now(&self) {
        let _ = self.process_now_tx.send(());
    }

    /// Waits for the processor worker to complete.
    ///
    /// Completion normally happens after a shutdown signal; without one this
    /// waits indefinitely.
    pub async fn wait(self) -> OutboxResult<()> {
        // Both transmitters must outlive the worker, otherwise dropping them
        // here would itself signal shutdown.
        let Pipeline {
            state,
            shutdown_tx,
            process_now_tx,
            ..
        } = self;

        let result = match state {
            PipelineState::NotStarted => {
                info!("pipeline was never started, nothing to wait for");

                Ok(())
            }
            PipelineState::Started { worker: None } => Ok(()),
            PipelineState::Started {
                worker: Some(worker),
            } => worker.wait().await,
        };

        drop(shutdown_tx);
        drop(process_now_tx);

        result
    }

    /// Signals the processor worker to shut down.
    ///
    /// Returns immediately; combine with [`Pipeline::wait`] or use
    /// [`Pipeline::shutdown_and_wait`] to block until the worker exits.
    pub fn shutdown(&self) {
        if self.shutdown_tx.shutdown().is_err() {
            error!("failed to send shutdown signal, the processor worker already terminated");
        }
    }

    /// Signals shutdown and waits for the processor worker to exit.
    pub async fn shutdown_and_wait(self) -> OutboxResult<()> {
        self.shutdown();
        self.wait().await
    }
}
