//! Pipeline construction helpers and polling utilities for tests.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::config::{BatchConfig, PipelineConfig, ProcessingConfig, ShardsConfig};
use crate::destination::SearchDestination;
use crate::pipeline::{Pipeline, PipelineId};
use crate::store::base::OutboxStore;

/// Pipeline configuration tuned for fast test cycles.
pub fn test_pipeline_config(id: PipelineId) -> PipelineConfig {
    PipelineConfig {
        id,
        batch: BatchConfig {
            max_size: 50,
            poll_interval_ms: 10,
        },
        shards: ShardsConfig::default(),
        processing: ProcessingConfig { enabled: true },
        max_retries: 3,
        retry_delay_ms: 10,
    }
}

/// Creates an unsharded pipeline with fast test timings.
pub fn create_pipeline<S, D>(id: PipelineId, store: S, destination: D) -> Pipeline<S, D>
where
    S: OutboxStore + Clone + Send + Sync + 'static,
    D: SearchDestination + Clone + Send + Sync + 'static,
{
    Pipeline::new(test_pipeline_config(id), store, destination)
}

/// Creates a pipeline that claims `assigned` out of `total_count` shards.
pub fn create_sharded_pipeline<S, D>(
    id: PipelineId,
    store: S,
    destination: D,
    total_count: u32,
    assigned: Vec<u32>,
) -> Pipeline<S, D>
where
    S: OutboxStore + Clone + Send + Sync + 'static,
    D: SearchDestination + Clone + Send + Sync + 'static,
{
    let mut config = test_pipeline_config(id);
    config.shards = ShardsConfig {
        static_partitioning: true,
        total_count: Some(total_count),
        assigned: Some(assigned),
    };

    Pipeline::new(config, store, destination)
}

/// Polls `condition` until it holds, panicking after ten seconds.
pub async fn wait_until<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Duration::from_secs(10);

    let waiting = async {
        loop {
            if condition().await {
                return;
            }

            sleep(Duration::from_millis(20)).await;
        }
    };

    if timeout(deadline, waiting).await.is_err() {
        panic!("condition '{description}' not reached within {deadline:?}");
    }
}
