//! Process-wide tracing/logging setup shared by the binary and tests.

/// Initialize observability for the process.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filter, JSON formatter).
pub mod tracing;
