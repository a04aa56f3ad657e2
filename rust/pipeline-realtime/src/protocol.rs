//! Phoenix-channel messages spoken by the realtime endpoint.

use crate::event::{ChangeEvent, EventMask};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";
pub const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

/// One table filter in a join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresChangesFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
}

impl PostgresChangesFilter {
    pub fn new(table: impl Into<String>, schema: impl Into<String>, mask: EventMask) -> Self {
        Self {
            event: mask.as_wire().to_string(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

/// Interpretation of an incoming frame for one channel topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    JoinOk,
    JoinError(String),
    Change(ChangeEvent),
    ChannelError,
    ChannelClosed,
    Ignored,
}

pub fn topic_for(channel: &str) -> String {
    format!("realtime:{}", channel)
}

impl PhoenixMessage {
    pub fn join(
        topic: &str,
        filters: &[PostgresChangesFilter],
        access_token: Option<&str>,
        msg_ref: String,
    ) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": filters,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }

        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload,
            msg_ref: Some(msg_ref),
        }
    }

    pub fn leave(topic: &str, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref),
        }
    }

    pub fn heartbeat(msg_ref: String) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref),
        }
    }

    /// Classify this frame from the point of view of the channel that joined
    /// `topic` with reference `join_ref`.
    pub fn classify(&self, topic: &str, join_ref: &str) -> Inbound {
        if self.topic != topic {
            return Inbound::Ignored;
        }

        match self.event.as_str() {
            EVENT_REPLY if self.msg_ref.as_deref() == Some(join_ref) => {
                match self.payload.get("status").and_then(Value::as_str) {
                    Some("ok") => Inbound::JoinOk,
                    Some(other) => Inbound::JoinError(
                        self.payload
                            .get("response")
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| other.to_string()),
                    ),
                    None => Inbound::JoinError("missing reply status".to_string()),
                }
            }
            EVENT_POSTGRES_CHANGES => match self.payload.get("data") {
                Some(data) => match serde_json::from_value::<ChangeEvent>(data.clone()) {
                    Ok(event) => Inbound::Change(event),
                    Err(e) => {
                        tracing::warn!("Unparseable change payload on {}: {}", topic, e);
                        Inbound::Ignored
                    }
                },
                None => Inbound::Ignored,
            },
            EVENT_SYSTEM => match self.payload.get("status").and_then(Value::as_str) {
                Some("error") => Inbound::ChannelError,
                _ => Inbound::Ignored,
            },
            EVENT_ERROR => Inbound::ChannelError,
            EVENT_CLOSE => Inbound::ChannelClosed,
            _ => Inbound::Ignored,
        }
    }
}
