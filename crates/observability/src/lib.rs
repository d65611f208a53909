//! Tracing/logging setup shared by the Herald binary and tests.

/// Initialize process-wide logging from the environment (`RUST_LOG`,
/// `HERALD_LOG_FORMAT`); JSON at `info` when neither is set.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    init_with(&ObservabilityConfig::from_env());
}

/// Initialize process-wide logging with an explicit configuration.
pub fn init_with(config: &ObservabilityConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{LOG_FORMAT_ENV, ObservabilityConfig};
