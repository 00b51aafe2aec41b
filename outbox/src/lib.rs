//! Outbox-based synchronization of a search index with a primary data store.
//!
//! Writers record entity changes into a durable change log in the same
//! transaction as their data changes. A background pipeline polls the log,
//! collapses redundant events, and dispatches the net index operations to a
//! search backend. Deployments with several nodes partition the log into
//! disjoint shards so every event is processed exactly once without any
//! cross-node locking.

pub mod concurrency;
pub mod config;
pub mod destination;
pub mod error;
pub mod failure;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod shard;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod writer;
