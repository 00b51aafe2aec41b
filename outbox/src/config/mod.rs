//! Configuration objects for the outbox engine.
//!
//! Configuration is read once at node startup and stays immutable for the
//! node's lifetime. Validation is fail-fast: every check runs before any
//! processing begins, so a misconfigured node never claims events.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for outbox configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("field '{field}' is required: {reason}")]
    MissingField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("invalid value for '{field}': {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: String,
    },
}

/// Batch retrieval configuration for the processing loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of events fetched and merged per polling cycle.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
    /// Milliseconds between two polling cycles of a node.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl BatchConfig {
    /// Default maximum batch size per polling cycle.
    pub const DEFAULT_MAX_SIZE: usize = 50;

    /// Default polling interval in milliseconds.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

    /// Validates batch configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "batch.max_size",
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Static shard partitioning configuration for one node.
///
/// When static partitioning is enabled, the node claims exactly the events
/// whose partition hash maps to one of its assigned shard indices. Nodes with
/// disjoint assignments never claim the same event; the assignment lists of
/// different nodes must together cover `[0, total_count)` exactly once for
/// aggregate throughput to cover every event. Overlap between two nodes is a
/// deployment error that local validation cannot see; duplicates within one
/// node's list are rejected here.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ShardsConfig {
    /// Enables static shard partitioning for this node.
    #[serde(rename = "static", default)]
    pub static_partitioning: bool,
    /// Total number of shards across all cooperating nodes.
    ///
    /// Required and strictly positive when static partitioning is enabled.
    pub total_count: Option<u32>,
    /// Shard indices assigned to this node, each in `[0, total_count)`.
    ///
    /// Required when static partitioning is enabled. An empty list is valid
    /// and means the node claims nothing.
    pub assigned: Option<Vec<u32>>,
}

impl ShardsConfig {
    /// Validates shard configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.static_partitioning {
            return Ok(());
        }

        let Some(total_count) = self.total_count else {
            return Err(ValidationError::MissingField {
                field: "shards.total_count",
                reason: "required when static sharding is enabled",
            });
        };

        if total_count == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "shards.total_count",
                constraint: "must be strictly positive".to_string(),
            });
        }

        let Some(assigned) = &self.assigned else {
            return Err(ValidationError::MissingField {
                field: "shards.assigned",
                reason: "required when static sharding is enabled",
            });
        };

        for (position, index) in assigned.iter().enumerate() {
            if *index >= total_count {
                return Err(ValidationError::InvalidFieldValue {
                    field: "shards.assigned",
                    constraint: format!(
                        "index {index} is out of range [0, {total_count})"
                    ),
                });
            }

            if assigned[..position].contains(index) {
                return Err(ValidationError::InvalidFieldValue {
                    field: "shards.assigned",
                    constraint: format!("index {index} is assigned more than once"),
                });
            }
        }

        Ok(())
    }
}

/// Enables or disables event processing on this node.
///
/// A disabled node keeps accepting writes to the change log but never polls
/// it, which allows running nodes that hold zero shards without configuring
/// sharding at all.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessingConfig {
    #[serde(default = "default_processing_enabled")]
    pub enabled: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enabled: default_processing_enabled(),
        }
    }
}

/// Configuration for one outbox processing pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The unique identifier for this pipeline.
    pub id: u64,
    /// Batch retrieval configuration.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Static shard partitioning configuration.
    #[serde(default)]
    pub shards: ShardsConfig,
    /// Event processing toggle for this node.
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Maximum number of failed dispatch attempts before an event is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds between two dispatch attempts; the actual
    /// delay grows exponentially with the attempt number plus jitter.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl PipelineConfig {
    /// Default number of failed attempts before an event is dropped.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Default base retry delay in milliseconds.
    pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;
        self.shards.validate()?;

        Ok(())
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}

fn default_poll_interval_ms() -> u64 {
    BatchConfig::DEFAULT_POLL_INTERVAL_MS
}

fn default_processing_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    PipelineConfig::DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    PipelineConfig::DEFAULT_RETRY_DELAY_MS
}
