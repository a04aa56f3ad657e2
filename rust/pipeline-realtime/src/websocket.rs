//! Change transport over the realtime WebSocket endpoint.
//!
//! Every channel drives its own socket on the ambient tokio runtime. Until the
//! join is confirmed the task reconnects with the configured backoff; once
//! confirmed, losing the socket ends the channel with a `Closed` report and a
//! fresh channel has to be opened.

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, Result};
use crate::event::{ChangeEvent, EventMask};
use crate::protocol::{topic_for, Inbound, PhoenixMessage, PostgresChangesFilter};
use crate::transport::{
    ChangeTransport, EventHandler, StatusHandler, TransportChannel, TransportStatus,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub struct WsTransport {
    config: RealtimeConfig,
    refs: Arc<AtomicU64>,
}

impl WsTransport {
    pub fn new(config: RealtimeConfig) -> Result<Self> {
        if config.websocket_url().is_none() {
            return Err(RealtimeError::MissingEndpoint);
        }
        Ok(Self {
            config,
            refs: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }
}

impl ChangeTransport for WsTransport {
    fn open_channel(&self, name: &str) -> Result<Box<dyn TransportChannel>> {
        Ok(Box::new(WsChannel {
            name: name.to_string(),
            config: self.config.clone(),
            refs: self.refs.clone(),
            listeners: Vec::new(),
            command_tx: None,
        }))
    }
}

struct Listener {
    resource: String,
    mask: EventMask,
    handler: EventHandler,
}

enum ChannelCommand {
    Leave,
}

struct WsChannel {
    name: String,
    config: RealtimeConfig,
    refs: Arc<AtomicU64>,
    listeners: Vec<Listener>,
    command_tx: Option<mpsc::Sender<ChannelCommand>>,
}

impl TransportChannel for WsChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_table_event(&mut self, resource: &str, mask: EventMask, handler: EventHandler) {
        self.listeners.push(Listener {
            resource: resource.to_string(),
            mask,
            handler,
        });
    }

    fn subscribe(&mut self, status: StatusHandler) -> Result<()> {
        if self.command_tx.is_some() {
            return Err(RealtimeError::SubscriptionFailed(format!(
                "{} is already subscribed",
                self.name
            )));
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;
        let url = self
            .config
            .websocket_url()
            .ok_or(RealtimeError::MissingEndpoint)?;

        let filters = self
            .listeners
            .iter()
            .map(|l| PostgresChangesFilter::new(&l.resource, &self.config.schema, l.mask))
            .collect();

        let task = ChannelTask {
            name: self.name.clone(),
            topic: topic_for(&self.name),
            url,
            config: self.config.clone(),
            filters,
            listeners: std::mem::take(&mut self.listeners),
            status,
            refs: self.refs.clone(),
        };

        let (command_tx, command_rx) = mpsc::channel(8);
        runtime.spawn(task.run(command_rx));
        self.command_tx = Some(command_tx);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            if tx.try_send(ChannelCommand::Leave).is_err() {
                tracing::debug!("Channel {} task already stopped", self.name);
            }
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

enum SessionEnd {
    Left,
    Closed,
    Lost,
    TimedOut,
}

struct ChannelTask {
    name: String,
    topic: String,
    url: String,
    config: RealtimeConfig,
    filters: Vec<PostgresChangesFilter>,
    listeners: Vec<Listener>,
    status: StatusHandler,
    refs: Arc<AtomicU64>,
}

impl ChannelTask {
    fn next_ref(&self) -> String {
        (self.refs.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    fn report(&self, status: TransportStatus) {
        (self.status)(status);
    }

    fn dispatch(&self, event: ChangeEvent) {
        for listener in &self.listeners {
            if listener.resource == event.resource && listener.mask.matches(event.kind) {
                (listener.handler)(event.clone());
            }
        }
    }

    async fn run(self, mut command_rx: mpsc::Receiver<ChannelCommand>) {
        let mut attempt: u32 = 0;
        let mut confirmed = false;

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((ws, _)) => match self.session(ws, &mut command_rx, &mut confirmed).await {
                    SessionEnd::Left | SessionEnd::Closed => {
                        self.report(TransportStatus::Closed);
                        return;
                    }
                    SessionEnd::Lost if confirmed => {
                        tracing::warn!("Channel {} lost its connection", self.name);
                        self.report(TransportStatus::Closed);
                        return;
                    }
                    SessionEnd::Lost => self.report(TransportStatus::ChannelError),
                    SessionEnd::TimedOut => self.report(TransportStatus::TimedOut),
                },
                Err(e) => {
                    tracing::error!("Connection failed for {}: {}", self.name, e);
                    self.report(TransportStatus::ChannelError);
                }
            }

            if !self.config.auto_reconnect || attempt >= self.config.max_reconnect_attempts {
                tracing::error!(
                    "Giving up on channel {} after {} attempts",
                    self.name,
                    attempt + 1
                );
                self.report(TransportStatus::Closed);
                return;
            }

            let delay = self.config.reconnect_delay(attempt);
            attempt += 1;
            tracing::info!(
                "Reconnecting {} in {:?} (attempt {})",
                self.name,
                delay,
                attempt
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = command_rx.recv() => {
                    self.report(TransportStatus::Closed);
                    return;
                }
            }
        }
    }

    async fn session<S>(
        &self,
        ws: S,
        command_rx: &mut mpsc::Receiver<ChannelCommand>,
        confirmed: &mut bool,
    ) -> SessionEnd
    where
        S: Stream<Item = std::result::Result<Message, WsError>> + Sink<Message, Error = WsError>,
    {
        let (mut ws_tx, mut ws_rx) = ws.split();

        let join_ref = self.next_ref();
        let join = PhoenixMessage::join(
            &self.topic,
            &self.filters,
            self.config.api_key.as_deref(),
            join_ref.clone(),
        );
        if let Err(e) = send_message(&mut ws_tx, &join).await {
            tracing::warn!("Join failed for {}: {}", self.name, e);
            return SessionEnd::Lost;
        }

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let join_deadline = sleep(self.config.join_timeout);
        tokio::pin!(join_deadline);

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame = match serde_json::from_str::<PhoenixMessage>(&text) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    tracing::debug!(
                                        "Skipping unparseable frame on {}: {}",
                                        self.name,
                                        e
                                    );
                                    continue;
                                }
                            };
                            match frame.classify(&self.topic, &join_ref) {
                                Inbound::JoinOk => {
                                    if !*confirmed {
                                        *confirmed = true;
                                        tracing::info!("Channel {} subscribed", self.name);
                                        self.report(TransportStatus::Subscribed);
                                    }
                                }
                                Inbound::JoinError(reason) => {
                                    tracing::warn!("Join rejected for {}: {}", self.name, reason);
                                    return SessionEnd::Lost;
                                }
                                Inbound::Change(event) => self.dispatch(event),
                                Inbound::ChannelError => return SessionEnd::Lost,
                                Inbound::ChannelClosed => return SessionEnd::Closed,
                                Inbound::Ignored => {}
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = ws_tx.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket error on {}: {}", self.name, e);
                            return SessionEnd::Lost;
                        }
                        _ => {}
                    }
                }
                _ = command_rx.recv() => {
                    let leave = PhoenixMessage::leave(&self.topic, self.next_ref());
                    let _ = send_message(&mut ws_tx, &leave).await;
                    let _ = ws_tx.close().await;
                    tracing::debug!("Left channel {}", self.name);
                    return SessionEnd::Left;
                }
                _ = heartbeat.tick() => {
                    let beat = PhoenixMessage::heartbeat(self.next_ref());
                    if let Err(e) = send_message(&mut ws_tx, &beat).await {
                        tracing::warn!("Heartbeat failed on {}: {}", self.name, e);
                        return SessionEnd::Lost;
                    }
                }
                _ = &mut join_deadline, if !*confirmed => {
                    tracing::warn!("Join timed out for {}", self.name);
                    return SessionEnd::TimedOut;
                }
            }
        }
    }
}

async fn send_message<S>(sink: &mut S, msg: &PhoenixMessage) -> Result<()>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = serde_json::to_string(msg)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
