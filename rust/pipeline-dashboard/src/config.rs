use crate::store::RestStore;
use crate::telemetry::TelemetryConfig;
use anyhow::Context;
use pipeline_realtime::{RealtimeConfig, WsTransport};

pub const URL_VARS: [&str; 2] = ["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
pub const KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"];
pub const JSON_LOGS_VAR: &str = "PIPELINE_JSON_LOGS";

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub store_url: String,
    pub anon_key: String,
    pub realtime: RealtimeConfig,
    pub json_logs: bool,
}

impl DashboardConfig {
    /// Store and change feed both served by the project at `url`.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let url = url.into();
        let anon_key = anon_key.into();
        Self {
            realtime: RealtimeConfig::new(url.clone()).with_api_key(anon_key.clone()),
            store_url: url,
            anon_key,
            json_logs: false,
        }
    }

    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    /// Load `.env.local` or `.env` if present, then read the process
    /// environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::from_filename(".env.local")
            .or_else(|_| dotenvy::from_filename(".env"))
            .or_else(|_| dotenvy::dotenv());
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(*name).filter(|v| !v.trim().is_empty()))
        };

        let url = first(&URL_VARS).with_context(|| format!("{} is not set", URL_VARS[0]))?;
        let key = first(&KEY_VARS).with_context(|| format!("{} is not set", KEY_VARS[0]))?;
        let json_logs = lookup(JSON_LOGS_VAR)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self::new(url, key).with_json_logs(json_logs))
    }

    pub fn rest_store(&self) -> RestStore {
        RestStore::new(&self.store_url, &self.anon_key)
    }

    pub fn ws_transport(&self) -> pipeline_realtime::Result<WsTransport> {
        WsTransport::new(self.realtime.clone())
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig::default().with_json_logs(self.json_logs)
    }
}
