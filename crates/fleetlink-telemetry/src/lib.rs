//! Tracing bootstrap for fleetlink binaries and tests.
//!
//! Everything in the subsystem logs through `tracing`; this crate owns the
//! subscriber setup so the binary and integration harnesses configure it one
//! way. `RUST_LOG` always wins over the configured default.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "fleetlink_channel" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

/// Guard returned by [`init_telemetry`]. Hold it for the lifetime of the
/// process; the subscriber stays installed until exit.
#[must_use]
pub struct TelemetryGuard {
    _private: (),
}

/// Initialize the telemetry subsystem. Call once at startup; a second call
/// panics because the global subscriber is already set.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }

    TelemetryGuard { _private: () }
}

/// Build the default filter string from the configured levels.
fn filter_directives(config: &TelemetryConfig) -> String {
    let mut directives = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        directives.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_default_level_only() {
        let config = TelemetryConfig::default();
        assert_eq!(filter_directives(&config), "info");
    }

    #[test]
    fn directives_include_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("fleetlink_channel".into(), Level::DEBUG),
                ("fleetlink_notify".into(), Level::TRACE),
            ],
            json: false,
        };
        assert_eq!(
            filter_directives(&config),
            "warn,fleetlink_channel=debug,fleetlink_notify=trace"
        );
    }
}
