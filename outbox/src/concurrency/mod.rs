//! Concurrency utilities for coordinating the processing loop.
//!
//! Coordination between nodes happens entirely through the static shard
//! partition, so this module only covers in-process concerns: the broadcast
//! shutdown channel every worker subscribes to, and lightweight signals used
//! to nudge a worker out of its polling schedule.

pub mod shutdown;
pub mod signal;
