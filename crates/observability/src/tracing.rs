//! Tracing/logging initialization.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// `json` (default) or `plain`.
pub const LOG_FORMAT_ENV: &str = "HERALD_LOG_FORMAT";

/// Subscriber options.
///
/// `RUST_LOG` always wins over `default_filter` when it is set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub default_filter: String,
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: true,
        }
    }
}

impl ObservabilityConfig {
    /// Defaults, with the output format taken from `HERALD_LOG_FORMAT`.
    pub fn from_env() -> Self {
        Self::with_format(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn with_format(format: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(format) = format {
            // Unknown values keep JSON; there is no subscriber yet to warn on.
            if matches!(format.trim().to_ascii_lowercase().as_str(), "plain" | "text") {
                config.json = false;
            }
        }
        config
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // JSON for machines, compact text for an operator's terminal.
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_does_not_panic() {
        let cfg = ObservabilityConfig {
            default_filter: "debug".into(),
            json: false,
        };
        init(&cfg);
        init(&cfg);
        init(&ObservabilityConfig::default());
    }

    #[test]
    fn log_format_selects_output() {
        assert!(ObservabilityConfig::with_format(None).json);
        assert!(ObservabilityConfig::with_format(Some("json")).json);
        assert!(!ObservabilityConfig::with_format(Some(" Plain ")).json);
        assert!(!ObservabilityConfig::with_format(Some("text")).json);
        assert!(ObservabilityConfig::with_format(Some("yaml")).json);
        assert_eq!(ObservabilityConfig::with_format(Some("plain")).default_filter, "info");
    }
}
