//! Long-lived owner of a single change-feed connection.
//!
//! A [`SubscriptionManager`] reconciles: each [`SubscriptionManager::configure`]
//! call compares the effective watch key and the enabled flag against what is
//! already open and only touches the connection when they differ. The change
//! callback lives in a shared cell that the dispatch path reads at event time,
//! so replacing it never reopens anything and events always reach the most
//! recent callback.
//!
//! ```rust,ignore
//! use pipeline_realtime::{MemoryTransport, SubscriptionManager, WatchSet};
//!
//! let transport = std::sync::Arc::new(MemoryTransport::auto_confirming());
//! let mut manager = SubscriptionManager::new(transport);
//! let status = manager.configure(
//!     WatchSet::from(["applications", "application_steps"]),
//!     |_event| Ok(()),
//!     true,
//! );
//! ```

use crate::connection::{ChangeFeedConnection, ConnectionStatus};
use crate::event::ChangeEvent;
use crate::transport::ChangeTransport;
use crate::watch_set::{WatchKey, WatchSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync>;

static CHANNEL_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Disabled,
    NoConnection,
    Connecting,
    Connected,
}

/// State shared with the dispatch closures handed to the transport.
struct Shared {
    callback: RwLock<ChangeCallback>,
    status_tx: watch::Sender<ConnectionStatus>,
    /// Identifies the live connection. Reports tagged with an older epoch
    /// come from a torn-down connection and are dropped.
    epoch: AtomicU64,
}

impl Shared {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    fn current_callback(&self) -> ChangeCallback {
        self.callback
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn set_callback(&self, callback: ChangeCallback) {
        *self.callback.write().unwrap_or_else(|p| p.into_inner()) = callback;
    }

    fn dispatch(&self, epoch: u64, event: ChangeEvent) {
        if !self.is_current(epoch) {
            tracing::debug!("Dropping change on {} from a closed channel", event.resource);
            return;
        }

        let callback = self.current_callback();
        match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Change callback failed for {}: {:#}", event.resource, e);
            }
            Err(_) => {
                tracing::error!("Change callback panicked for {}", event.resource);
            }
        }
    }

    fn publish_status(&self, epoch: u64, status: ConnectionStatus) {
        if self.is_current(epoch) {
            self.status_tx.send_replace(status);
        }
    }
}

struct ActiveConnection {
    key: WatchKey,
    connection: ChangeFeedConnection,
}

pub struct SubscriptionManager {
    transport: Arc<dyn ChangeTransport>,
    shared: Arc<Shared>,
    status_rx: watch::Receiver<ConnectionStatus>,
    enabled: bool,
    active: Option<ActiveConnection>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn ChangeTransport>) -> Self {
        let noop: ChangeCallback = Arc::new(|_: &ChangeEvent| Ok(()));
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);

        Self {
            transport,
            shared: Arc::new(Shared {
                callback: RwLock::new(noop),
                status_tx,
                epoch: AtomicU64::new(0),
            }),
            status_rx,
            enabled: false,
            active: None,
        }
    }

    /// Apply a watch configuration and return the current status.
    ///
    /// The callback is always replaced. The connection is only reopened when
    /// the watch key changes or the manager goes from disabled to enabled.
    pub fn configure<F>(
        &mut self,
        watch_set: impl Into<WatchSet>,
        on_change: F,
        enabled: bool,
    ) -> ConnectionStatus
    where
        F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.configure_callback(watch_set.into(), Arc::new(on_change), enabled)
    }

    pub fn configure_callback(
        &mut self,
        watch_set: WatchSet,
        on_change: ChangeCallback,
        enabled: bool,
    ) -> ConnectionStatus {
        self.shared.set_callback(on_change);

        if !enabled {
            self.disable();
            return self.status();
        }
        self.enabled = true;

        if watch_set.is_empty() {
            if self.teardown() {
                tracing::debug!("Watch set emptied, subscription released");
            }
            self.set_status(ConnectionStatus::Disconnected);
            return self.status();
        }

        let key = watch_set.key();
        if let Some(active) = &self.active {
            if active.key == key {
                tracing::trace!("Subscription for {} already exists, skipping creation", key);
                return self.status();
            }
            tracing::debug!("Watch key changed from {} to {}", active.key, key);
        }

        self.teardown();
        self.open(key, &watch_set);
        self.status()
    }

    /// Release the connection and report `Disconnected`. Idempotent.
    pub fn disable(&mut self) {
        if self.teardown() {
            tracing::info!("Disabling subscription");
        }
        self.enabled = false;
        self.set_status(ConnectionStatus::Disconnected);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// A receiver that observes every status change as it happens.
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Stream of statuses starting with the current one.
    pub fn status_stream(&self) -> WatchStream<ConnectionStatus> {
        WatchStream::new(self.status_rx.clone())
    }

    pub fn state(&self) -> ManagerState {
        if !self.enabled {
            return ManagerState::Disabled;
        }
        match (&self.active, self.status()) {
            (Some(_), ConnectionStatus::Connecting) => ManagerState::Connecting,
            (Some(_), ConnectionStatus::Connected) => ManagerState::Connected,
            _ => ManagerState::NoConnection,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn watch_key(&self) -> Option<&WatchKey> {
        self.active.as_ref().map(|a| &a.key)
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.connection.channel_name())
    }

    fn open(&mut self, key: WatchKey, watch_set: &WatchSet) {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let channel_name = channel_name_for(&key);
        tracing::info!("Creating subscription: {}", channel_name);

        self.set_status(ConnectionStatus::Connecting);

        let dispatch = self.shared.clone();
        let status = self.shared.clone();
        let connection = ChangeFeedConnection::open(
            self.transport.as_ref(),
            channel_name,
            watch_set.resources(),
            Arc::new(move |event: ChangeEvent| dispatch.dispatch(epoch, event)),
            Arc::new(move |s: ConnectionStatus| status.publish_status(epoch, s)),
        );

        self.active = Some(ActiveConnection { key, connection });
    }

    /// Close the live connection, if any. Returns whether one existed.
    fn teardown(&mut self) -> bool {
        // Retire the epoch first so the close report cannot leak through.
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        match self.active.take() {
            Some(mut active) => {
                tracing::info!("Cleaning up subscription: {}", active.connection.channel_name());
                active.connection.close();
                true
            }
            None => false,
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.shared.status_tx.send_replace(status);
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("enabled", &self.enabled)
            .field("watch_key", &self.watch_key())
            .field("status", &self.status())
            .finish()
    }
}

fn channel_name_for(key: &WatchKey) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = CHANNEL_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("realtime_{}_{}_{}", key, millis, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;

    fn manager() -> (Arc<MemoryTransport>, SubscriptionManager) {
        let transport = Arc::new(MemoryTransport::new());
        let manager = SubscriptionManager::new(transport.clone());
        (transport, manager)
    }

    #[test]
    fn test_channel_names_are_unique_per_open() {
        let key = WatchSet::from("applications").key();
        let a = channel_name_for(&key);
        let b = channel_name_for(&key);
        assert!(a.starts_with("realtime_applications_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_state_machine_walk() {
        let (transport, mut manager) = manager();
        assert_eq!(manager.state(), ManagerState::Disabled);

        manager.configure("applications", |_| Ok(()), true);
        assert_eq!(manager.state(), ManagerState::Connecting);

        transport.confirm_all();
        assert_eq!(manager.state(), ManagerState::Connected);

        transport.drop_connection(manager.channel_name().unwrap());
        assert_eq!(manager.state(), ManagerState::NoConnection);

        manager.disable();
        assert_eq!(manager.state(), ManagerState::Disabled);
    }

    #[test]
    fn test_empty_watch_set_holds_no_connection() {
        let (transport, mut manager) = manager();
        let status = manager.configure(WatchSet::default(), |_| Ok(()), true);

        assert_eq!(status, ConnectionStatus::Disconnected);
        assert_eq!(transport.open_count(), 0);
        assert_eq!(manager.state(), ManagerState::NoConnection);
    }

    #[test]
    fn test_drop_releases_connection() {
        let (transport, mut manager) = manager();
        manager.configure("applications", |_| Ok(()), true);
        drop(manager);

        assert_eq!(transport.close_count(), 1);
        assert!(transport.live_channels().is_empty());
    }

    #[test]
    fn test_status_receiver_observes_changes() {
        let (transport, mut manager) = manager();
        let mut rx = manager.status_receiver();
        manager.configure("applications", |_| Ok(()), true);
        rx.borrow_and_update();

        transport.confirm_all();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Connected);
    }
}
