use std::time::Duration;

pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Base URL of the store, `http(s)://` or `ws(s)://`.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub schema: String,
    pub auto_reconnect: bool,
    pub reconnect_intervals: Vec<Duration>,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval: Duration,
    /// How long a join may go unanswered before it is retried.
    pub join_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            schema: DEFAULT_SCHEMA.to_string(),
            auto_reconnect: true,
            reconnect_intervals: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ],
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
        }
    }
}

impl RealtimeConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_intervals(mut self, intervals: Vec<Duration>) -> Self {
        self.reconnect_intervals = intervals;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Delay before reconnect attempt `attempt` (zero-based). Past the end of
    /// the schedule the last interval repeats.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_intervals
            .get(attempt as usize)
            .copied()
            .unwrap_or_else(|| {
                self.reconnect_intervals
                    .last()
                    .copied()
                    .unwrap_or(Duration::from_secs(16))
            })
    }

    /// WebSocket URL of the realtime endpoint, including the api key and
    /// protocol version query parameters.
    pub fn websocket_url(&self) -> Option<String> {
        let endpoint = self.endpoint.trim_end_matches('/');
        if endpoint.is_empty() {
            return None;
        }

        let base = if let Some(rest) = endpoint.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = endpoint.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            endpoint.to_string()
        };

        let mut url = if base.ends_with("/websocket") {
            base
        } else {
            format!("{}/realtime/v1/websocket", base)
        };

        url.push_str("?vsn=1.0.0");
        if let Some(key) = &self.api_key {
            url.push_str("&apikey=");
            url.push_str(key);
        }
        Some(url)
    }
}
