//! Static shard partitioning of the event space.
//!
//! Ownership of an event is a pure function of its entity partition hash, so
//! cooperating nodes need no communication, locks, or consensus: a node claims
//! an event exactly when the hash maps into one of its assigned shard indices.
//! All events of one entity share a hash and therefore a shard, which keeps
//! per-entity ordering within a single node.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ShardsConfig;
use crate::error::{ErrorKind, OutboxResult};
use crate::outbox_error;
use crate::store::filter::{EventFilter, FilterValue};
use crate::types::OutboxEvent;

/// The set of events a node claims.
#[derive(Debug, Clone)]
enum ShardScope {
    /// Static partitioning disabled: the node claims every event.
    All,
    /// The node claims events whose hash maps into `assigned`.
    Static {
        total_count: u32,
        assigned: Arc<HashSet<u32>>,
    },
}

/// Deterministic, stateless mapping from events to owning nodes.
#[derive(Debug, Clone)]
pub struct ShardPartitioner {
    scope: ShardScope,
}

impl ShardPartitioner {
    /// Builds a partitioner from validated shard configuration.
    ///
    /// Validation failures are fatal configuration errors raised before any
    /// processing begins, never at first poll.
    pub fn new(config: &ShardsConfig) -> OutboxResult<Self> {
        config.validate().map_err(|err| {
            outbox_error!(
                ErrorKind::ConfigError,
                "Invalid shard configuration",
                detail = err.to_string()
            )
        })?;

        if !config.static_partitioning {
            return Ok(Self {
                scope: ShardScope::All,
            });
        }

        // validate() guarantees both fields are present here.
        let total_count = config.total_count.unwrap_or_default();
        let assigned = config
            .assigned
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();

        Ok(Self {
            scope: ShardScope::Static {
                total_count,
                assigned: Arc::new(assigned),
            },
        })
    }

    /// Maps a partition hash to its shard index.
    ///
    /// Returns `None` when static partitioning is disabled and the notion of a
    /// shard index does not apply.
    pub fn shard_of(&self, entity_hash: i64) -> Option<u32> {
        match &self.scope {
            ShardScope::All => None,
            ShardScope::Static { total_count, .. } => {
                // The hash is a widened u32, so the remainder is non-negative.
                Some((entity_hash % i64::from(*total_count)) as u32)
            }
        }
    }

    /// Whether this node owns the given event.
    pub fn owns(&self, event: &OutboxEvent) -> bool {
        match &self.scope {
            ShardScope::All => true,
            ShardScope::Static { assigned, .. } => match self.shard_of(event.entity_hash) {
                Some(shard) => assigned.contains(&shard),
                None => false,
            },
        }
    }

    /// Whether this node can ever claim an event.
    ///
    /// False for nodes with an empty assignment, a valid "processing disabled"
    /// state that skips polling entirely.
    pub fn claims_any(&self) -> bool {
        match &self.scope {
            ShardScope::All => true,
            ShardScope::Static { assigned, .. } => !assigned.is_empty(),
        }
    }

    /// Exposes the ownership condition as a finder filter term.
    pub fn filter(&self) -> ShardFilter {
        ShardFilter {
            scope: self.scope.clone(),
        }
    }
}

/// Finder filter restricting a batch to the shards a node owns.
#[derive(Debug, Clone)]
pub struct ShardFilter {
    scope: ShardScope,
}

impl EventFilter for ShardFilter {
    fn fragment(&self, alias: &str) -> String {
        match &self.scope {
            ShardScope::All => "true".to_string(),
            ShardScope::Static { .. } => {
                format!("({alias}.entity_hash % :shard_total) = any(:shard_assigned)")
            }
        }
    }

    fn parameters(&self) -> Vec<(&'static str, FilterValue)> {
        match &self.scope {
            ShardScope::All => Vec::new(),
            ShardScope::Static {
                total_count,
                assigned,
            } => {
                let mut assigned = assigned
                    .iter()
                    .map(|index| i64::from(*index))
                    .collect::<Vec<_>>();
                assigned.sort_unstable();

                vec![
                    ("shard_total", FilterValue::BigInt(i64::from(*total_count))),
                    ("shard_assigned", FilterValue::BigIntArray(assigned)),
                ]
            }
        }
    }

    fn matches(&self, event: &OutboxEvent) -> bool {
        match &self.scope {
            ShardScope::All => true,
            ShardScope::Static {
                total_count,
                assigned,
            } => {
                let shard = (event.entity_hash % i64::from(*total_count)) as u32;
                assigned.contains(&shard)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityRef, EventType, entity_partition_hash};
    use chrono::Utc;

    fn static_config(total_count: u32, assigned: Vec<u32>) -> ShardsConfig {
        ShardsConfig {
            static_partitioning: true,
            total_count: Some(total_count),
            assigned: Some(assigned),
        }
    }

    fn event_for(entity_id: &str) -> OutboxEvent {
        OutboxEvent {
            id: 1,
            entity: EntityRef::new("user", entity_id),
            entity_hash: entity_partition_hash("user", entity_id),
            event_type: EventType::AddOrUpdate,
            payload: Vec::new(),
            moment: Utc::now(),
            retry_count: 0,
        }
    }

    #[test]
    fn test_disabled_partitioning_claims_everything() {
        let partitioner = ShardPartitioner::new(&ShardsConfig::default()).unwrap();

        assert!(partitioner.claims_any());
        assert!(partitioner.owns(&event_for("1")));
        assert_eq!(partitioner.filter().fragment("e"), "true");
    }

    #[test]
    fn test_empty_assignment_claims_nothing() {
        let partitioner = ShardPartitioner::new(&static_config(4, vec![])).unwrap();

        assert!(!partitioner.claims_any());
        for i in 0..100 {
            assert!(!partitioner.owns(&event_for(&i.to_string())));
        }
    }

    #[test]
    fn test_disjoint_nodes_never_claim_the_same_event() {
        let first = ShardPartitioner::new(&static_config(3, vec![0])).unwrap();
        let second = ShardPartitioner::new(&static_config(3, vec![1, 2])).unwrap();

        for i in 0..1000 {
            let event = event_for(&i.to_string());
            let claims = [first.owns(&event), second.owns(&event)];
            assert_eq!(claims.iter().filter(|owned| **owned).count(), 1);
        }
    }

    #[test]
    fn test_distribution_tracks_assigned_share() {
        // A node owning 1 of 4 shards should see roughly a quarter of a large
        // entity population, within a 25% tolerance.
        let partitioner = ShardPartitioner::new(&static_config(4, vec![2])).unwrap();

        let owned = (0..1000)
            .filter(|i| partitioner.owns(&event_for(&i.to_string())))
            .count();

        assert!(
            (188..=312).contains(&owned),
            "expected roughly 250 owned events, got {owned}"
        );
    }

    #[test]
    fn test_invalid_configuration_is_fatal() {
        let out_of_range = static_config(2, vec![2]);
        let err = ShardPartitioner::new(&out_of_range).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        let zero_total = static_config(0, vec![]);
        assert!(ShardPartitioner::new(&zero_total).is_err());

        let missing_assignment = ShardsConfig {
            static_partitioning: true,
            total_count: Some(2),
            assigned: None,
        };
        assert!(ShardPartitioner::new(&missing_assignment).is_err());
    }

    #[test]
    fn test_filter_agrees_with_partitioner() {
        let partitioner = ShardPartitioner::new(&static_config(5, vec![0, 3])).unwrap();
        let filter = partitioner.filter();

        for i in 0..200 {
            let event = event_for(&i.to_string());
            assert_eq!(partitioner.owns(&event), filter.matches(&event));
        }
    }

    #[test]
    fn test_filter_fragment_and_parameters() {
        let partitioner = ShardPartitioner::new(&static_config(4, vec![3, 1])).unwrap();
        let filter = partitioner.filter();

        assert_eq!(
            filter.fragment("e"),
            "(e.entity_hash % :shard_total) = any(:shard_assigned)"
        );
        assert_eq!(
            filter.parameters(),
            vec![
                ("shard_total", FilterValue::BigInt(4)),
                ("shard_assigned", FilterValue::BigIntArray(vec![1, 3])),
            ]
        );
    }
}
