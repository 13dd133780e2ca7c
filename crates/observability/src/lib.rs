//! Logging setup shared by CareFleet services, benches and tests.

/// Initialize process-wide logging with the default settings.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::LogSettings::default().install();
}

/// Subscriber configuration (filters, format).
pub mod tracing;

pub use self::tracing::{LogFormat, LogSettings, init_for_tests};
