//! In-process change transport.
//!
//! Events are dispatched synchronously on the caller's thread, which makes the
//! transport suitable both as the change feed of an embedded store and as a
//! deterministic driver in tests.

use crate::error::{RealtimeError, Result};
use crate::event::{ChangeEvent, EventMask};
use crate::transport::{
    ChangeTransport, EventHandler, StatusHandler, TransportChannel, TransportStatus,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

struct Listener {
    resource: String,
    mask: EventMask,
    handler: EventHandler,
}

struct ChannelEntry {
    name: String,
    listeners: Vec<Listener>,
    status: Option<StatusHandler>,
    confirmed: bool,
}

#[derive(Default)]
struct MemoryState {
    channels: BTreeMap<u64, ChannelEntry>,
    next_id: u64,
    opens: usize,
    closes: usize,
    auto_confirm: bool,
    fail_next_open: bool,
    fail_next_subscribe: bool,
}

#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirm every subscription as soon as it is requested.
    pub fn auto_confirming() -> Self {
        let transport = Self::new();
        transport.lock().auto_confirm = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_auto_confirm(&self, enabled: bool) {
        self.lock().auto_confirm = enabled;
    }

    pub fn fail_next_open(&self) {
        self.lock().fail_next_open = true;
    }

    pub fn fail_next_subscribe(&self) {
        self.lock().fail_next_subscribe = true;
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn live_channels(&self) -> Vec<String> {
        self.lock()
            .channels
            .values()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.lock()
            .channels
            .values()
            .find(|entry| entry.name == channel)
            .map(|entry| entry.listeners.len())
            .unwrap_or(0)
    }

    /// Deliver `event` to every confirmed listener on its resource. Returns
    /// the number of handlers invoked.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        let handlers: Vec<EventHandler> = {
            let state = self.lock();
            state
                .channels
                .values()
                .filter(|entry| entry.confirmed)
                .flat_map(|entry| entry.listeners.iter())
                .filter(|l| l.resource == event.resource && l.mask.matches(event.kind))
                .map(|l| l.handler.clone())
                .collect()
        };

        for handler in &handlers {
            handler(event.clone());
        }
        handlers.len()
    }

    pub fn confirm(&self, channel: &str) -> bool {
        self.report(channel, TransportStatus::Subscribed)
    }

    pub fn confirm_all(&self) -> usize {
        let names = self.live_channels();
        names.iter().filter(|name| self.confirm(name)).count()
    }

    /// Simulate loss of the underlying connection for `channel`.
    pub fn drop_connection(&self, channel: &str) -> bool {
        self.report(channel, TransportStatus::ChannelError)
    }

    /// Push a raw status report to a subscribed channel.
    pub fn report(&self, channel: &str, status: TransportStatus) -> bool {
        let handler = {
            let mut state = self.lock();
            let Some(entry) = state.channels.values_mut().find(|e| e.name == channel) else {
                return false;
            };
            let Some(handler) = entry.status.clone() else {
                return false;
            };
            entry.confirmed = status == TransportStatus::Subscribed;
            handler
        };

        handler(status);
        true
    }
}

impl ChangeTransport for MemoryTransport {
    fn open_channel(&self, name: &str) -> Result<Box<dyn TransportChannel>> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next_open) {
            return Err(RealtimeError::ChannelOpenFailed(name.to_string()));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.opens += 1;
        state.channels.insert(
            id,
            ChannelEntry {
                name: name.to_string(),
                listeners: Vec::new(),
                status: None,
                confirmed: false,
            },
        );

        Ok(Box::new(MemoryChannel {
            id,
            name: name.to_string(),
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct MemoryChannel {
    id: u64,
    name: String,
    state: Arc<Mutex<MemoryState>>,
    closed: bool,
}

impl MemoryChannel {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TransportChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_table_event(&mut self, resource: &str, mask: EventMask, handler: EventHandler) {
        let id = self.id;
        if let Some(entry) = self.lock().channels.get_mut(&id) {
            entry.listeners.push(Listener {
                resource: resource.to_string(),
                mask,
                handler,
            });
        }
    }

    fn subscribe(&mut self, status: StatusHandler) -> Result<()> {
        let id = self.id;
        let confirm_now = {
            let mut state = self.lock();
            if std::mem::take(&mut state.fail_next_subscribe) {
                return Err(RealtimeError::SubscriptionFailed(self.name.clone()));
            }
            let auto_confirm = state.auto_confirm;
            let entry = state
                .channels
                .get_mut(&id)
                .ok_or(RealtimeError::ChannelClosed)?;
            entry.status = Some(status.clone());
            entry.confirmed = auto_confirm;
            auto_confirm
        };

        if confirm_now {
            status(TransportStatus::Subscribed);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let id = self.id;
        let removed = {
            let mut state = self.lock();
            let removed = state.channels.remove(&id);
            if removed.is_some() {
                state.closes += 1;
            }
            removed
        };

        if let Some(handler) = removed.and_then(|entry| entry.status) {
            handler(TransportStatus::Closed);
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = counter.clone();
        Arc::new(move |_event: ChangeEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_events_reach_confirmed_listeners_only() {
        let transport = MemoryTransport::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let mut channel = transport.open_channel("realtime_applications_1").unwrap();
        channel.on_table_event("applications", EventMask::All, counting_handler(&counter));
        channel.subscribe(Arc::new(|_: TransportStatus| {})).unwrap();

        assert_eq!(transport.emit(ChangeEvent::insert("applications", json!({}))), 0);

        transport.confirm("realtime_applications_1");
        assert_eq!(transport.emit(ChangeEvent::insert("applications", json!({}))), 1);
        assert_eq!(transport.emit(ChangeEvent::insert("application_steps", json!({}))), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mask_filters_kinds() {
        let transport = MemoryTransport::auto_confirming();
        let counter = Arc::new(AtomicUsize::new(0));

        let mut channel = transport.open_channel("c").unwrap();
        channel.on_table_event(
            "applications",
            EventMask::Only(ChangeKind::Delete),
            counting_handler(&counter),
        );
        channel.subscribe(Arc::new(|_: TransportStatus| {})).unwrap();

        transport.emit(ChangeEvent::insert("applications", json!({})));
        transport.emit(ChangeEvent::delete("applications", json!({})));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_reports_closed() {
        let transport = MemoryTransport::auto_confirming();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();

        let mut channel = transport.open_channel("c").unwrap();
        channel
            .subscribe(Arc::new(move |s: TransportStatus| {
                sink.lock().unwrap().push(s)
            }))
            .unwrap();
        channel.close();
        channel.close();
        drop(channel);

        assert_eq!(transport.close_count(), 1);
        assert!(transport.live_channels().is_empty());
        assert_eq!(
            *statuses.lock().unwrap(),
            vec![TransportStatus::Subscribed, TransportStatus::Closed]
        );
    }

    #[test]
    fn test_injected_failures_fire_once() {
        let transport = MemoryTransport::new();
        transport.fail_next_open();
        assert!(transport.open_channel("a").is_err());
        assert!(transport.open_channel("b").is_ok());

        transport.fail_next_subscribe();
        let mut channel = transport.open_channel("c").unwrap();
        assert!(channel.subscribe(Arc::new(|_: TransportStatus| {})).is_err());
        let mut channel = transport.open_channel("d").unwrap();
        assert!(channel.subscribe(Arc::new(|_: TransportStatus| {})).is_ok());
    }
}
