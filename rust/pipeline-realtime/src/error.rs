use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Missing realtime endpoint")]
    MissingEndpoint,

    #[error("Channel open failed: {0}")]
    ChannelOpenFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("No tokio runtime available to drive the channel")]
    NoRuntime,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
