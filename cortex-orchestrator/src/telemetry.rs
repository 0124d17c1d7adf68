//! Tracing subscriber setup
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a fmt
//! layer, plain or JSON. Call once at startup, before any spans are entered.

use cortex_core::{CortexError, CortexResult, LifecycleError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Log output configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `cortex_orchestrator=debug,info`
    pub filter: String,
    /// Emit newline-delimited JSON instead of human-readable lines
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Read configuration from the environment.
    ///
    /// # Environment Variables
    /// - `CORTEX_LOG`: filter directives, falling back to `RUST_LOG` (default: info)
    /// - `CORTEX_LOG_FORMAT`: `json` for JSON output (default: plain)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup("CORTEX_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let json = lookup("CORTEX_LOG_FORMAT")
            .map(|s| s.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        Self { filter, json }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
/// `LifecycleError::Telemetry` when the filter does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> CortexResult<()> {
    let env_filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| telemetry_error(format!("Invalid log filter {:?}: {}", config.filter, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| telemetry_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(filter = %config.filter, json = config.json, "Telemetry initialized");
    Ok(())
}

fn telemetry_error(reason: String) -> CortexError {
    CortexError::Lifecycle(LifecycleError::Telemetry { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = TelemetryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_cortex_log_wins_over_rust_log() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            ("CORTEX_LOG", "cortex_cache=debug"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.filter, "cortex_cache=debug");

        let config = TelemetryConfig::from_lookup(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.filter, "warn");
    }

    #[test]
    fn test_json_format() {
        let config = TelemetryConfig::from_lookup(lookup(&[("CORTEX_LOG_FORMAT", "JSON")]));
        assert!(config.json);
        let config = TelemetryConfig::from_lookup(lookup(&[("CORTEX_LOG_FORMAT", "pretty")]));
        assert!(!config.json);
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = TelemetryConfig {
            filter: "cortex=verbose".to_string(),
            json: false,
        };
        assert!(matches!(
            init_tracing(&config),
            Err(CortexError::Lifecycle(LifecycleError::Telemetry { .. }))
        ));
    }
}
