//! Shared tracing setup for binaries and tests.

/// Initialize process-wide structured logging.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize logging routed through the test harness's captured output.
pub fn init_test() {
    tracing::init_test();
}

/// Tracing configuration (filters, formatters).
pub mod tracing;
