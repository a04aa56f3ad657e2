use crate::event::{ChangeEvent, EventMask};
use crate::transport::{ChangeTransport, EventHandler, TransportChannel, TransportStatus};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    /// Status after the transport reports `reported`, or `None` when the
    /// report does not move this connection forward.
    ///
    /// Per connection the status only advances: connecting, connected,
    /// disconnected. Disconnected is terminal.
    pub fn advance(self, reported: TransportStatus) -> Option<ConnectionStatus> {
        use ConnectionStatus::*;
        match (self, reported) {
            (Disconnected, _) => None,
            (_, TransportStatus::Closed) => Some(Disconnected),
            (Connecting, TransportStatus::Subscribed) => Some(Connected),
            (Connected, TransportStatus::Subscribed) => None,
            // The transport keeps retrying until the join is confirmed.
            (Connecting, TransportStatus::ChannelError | TransportStatus::TimedOut) => None,
            (Connected, TransportStatus::ChannelError | TransportStatus::TimedOut) => {
                Some(Disconnected)
            }
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ConnectionStatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// One open change-feed channel listening on a fixed list of resources.
///
/// Setup failures never escape [`ChangeFeedConnection::open`]; they surface as
/// a `Disconnected` status report. Dropping the connection closes it.
pub struct ChangeFeedConnection {
    channel_name: String,
    resources: Vec<String>,
    status: Arc<Mutex<ConnectionStatus>>,
    on_status: ConnectionStatusHandler,
    channel: Option<Box<dyn TransportChannel>>,
}

impl ChangeFeedConnection {
    pub fn open(
        transport: &dyn ChangeTransport,
        channel_name: impl Into<String>,
        resources: &[String],
        on_event: EventHandler,
        on_status: ConnectionStatusHandler,
    ) -> Self {
        let channel_name = channel_name.into();
        let status = Arc::new(Mutex::new(ConnectionStatus::Connecting));
        on_status(ConnectionStatus::Connecting);

        let mut connection = Self {
            channel_name,
            resources: resources.to_vec(),
            status,
            on_status,
            channel: None,
        };

        let mut channel = match transport.open_channel(&connection.channel_name) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!("Failed to open channel {}: {}", connection.channel_name, e);
                connection.mark_disconnected();
                return connection;
            }
        };

        for resource in &connection.resources {
            let on_event = on_event.clone();
            let resource_name = resource.clone();
            channel.on_table_event(
                resource,
                EventMask::All,
                Arc::new(move |event: ChangeEvent| {
                    tracing::debug!("Change on {}: {:?}", resource_name, event.kind);
                    on_event(event);
                }),
            );
        }

        let tracker = connection.status.clone();
        let forward = connection.on_status.clone();
        let name = connection.channel_name.clone();
        let status_handler = Arc::new(move |reported: TransportStatus| {
            tracing::debug!("Subscription status for {}: {:?}", name, reported);
            let next = {
                let mut current = tracker.lock().unwrap_or_else(|p| p.into_inner());
                match current.advance(reported) {
                    Some(next) => {
                        *current = next;
                        next
                    }
                    None => return,
                }
            };
            forward(next);
        });

        if let Err(e) = channel.subscribe(status_handler) {
            tracing::error!("Subscription failed for {}: {}", connection.channel_name, e);
            channel.close();
            connection.mark_disconnected();
            return connection;
        }

        connection.channel = Some(channel);
        connection
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    /// Release the channel. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            tracing::info!("Closing channel {}", self.channel_name);
            channel.close();
        }
        self.mark_disconnected();
    }

    fn mark_disconnected(&self) {
        let changed = {
            let mut current = self.status.lock().unwrap_or_else(|p| p.into_inner());
            let changed = *current != ConnectionStatus::Disconnected;
            *current = ConnectionStatus::Disconnected;
            changed
        };
        if changed {
            (self.on_status)(ConnectionStatus::Disconnected);
        }
    }
}

impl Drop for ChangeFeedConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChangeFeedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeedConnection")
            .field("channel_name", &self.channel_name)
            .field("resources", &self.resources)
            .field("status", &self.status())
            .finish()
    }
}
