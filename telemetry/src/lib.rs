//! Telemetry initialization shared by binaries and tests.

pub mod tracing;

pub use crate::tracing::{init_test_tracing, init_tracing};
