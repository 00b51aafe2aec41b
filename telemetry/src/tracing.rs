//! Tracing subscriber setup for production and test environments.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Guards against installing the global subscriber more than once.
///
/// Tests within one binary share a process, so every test can safely call
/// [`init_test_tracing`] without worrying about double initialization.
static INIT_TEST_TRACING: Once = Once::new();

/// Initializes a tracing subscriber suitable for binaries.
///
/// The filter is read from `RUST_LOG`, falling back to `info` when the variable
/// is unset or invalid.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Initializes tracing for tests, routing output through the test writer.
///
/// Output is captured per test and only shown for failing tests. Repeated calls
/// are no-ops, which allows every test to call this unconditionally.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .init();
    });
}
