//! Tracing subscriber installation.
//!
//! JSON lines by default, filtered by `RUST_LOG` with a fallback directive.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    pub format: LogFormat,
    /// Route output through the test harness capture.
    pub test_writer: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            format: LogFormat::Json,
            test_writer: false,
        }
    }
}

impl LogSettings {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }

    /// Install the global subscriber. Returns `false` if one was already set.
    pub fn install(&self) -> bool {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false);

        let installed = match (self.format, self.test_writer) {
            (LogFormat::Json, false) => builder.json().try_init().is_ok(),
            (LogFormat::Json, true) => builder.json().with_test_writer().try_init().is_ok(),
            (LogFormat::Pretty, false) => builder.pretty().try_init().is_ok(),
            (LogFormat::Pretty, true) => builder.pretty().with_test_writer().try_init().is_ok(),
        };
        if installed {
            ::tracing::debug!(filter = %self.default_filter, format = ?self.format, "logging initialized");
        }
        installed
    }
}

/// Human-readable output captured per test. Safe to call from every test.
pub fn init_for_tests() {
    LogSettings {
        default_filter: "debug".to_string(),
        format: LogFormat::Pretty,
        test_writer: true,
    }
    .install();
}
