//! Tracing setup for binaries that embed the dashboard.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pipeline-dashboard".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter. Fails if a global subscriber is already set.
pub fn init(config: TelemetryConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        let fmt_layer = tracing_subscriber::fmt::layer().json().flatten_event(true);
        registry.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        registry.with(fmt_layer).try_init()?;
    }

    tracing::info!(service = %config.service_name, json = config.json_logs, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = TelemetryConfig::new("dashboard-test").with_json_logs(true);
        assert_eq!(config.service_name, "dashboard-test");
        assert!(config.json_logs);
        assert!(!TelemetryConfig::default().json_logs);
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init(TelemetryConfig::default());
        assert!(init(TelemetryConfig::default()).is_err());
    }
}
