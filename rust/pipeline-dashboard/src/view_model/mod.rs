//! Live views: a query result kept fresh by re-running the query whenever the
//! change feed reports a write to one of the watched tables.

mod grid;
mod monitor;
mod stats;

pub use grid::{ApplicationsGrid, GridFetcher};
pub use monitor::{RealtimeMonitor, MONITOR_LOG_CAPACITY};
pub use stats::{DashboardStats, Stats, StatsFetcher};

use crate::error::Result;
use crate::store::RecordStore;
use async_trait::async_trait;
use pipeline_realtime::{
    ChangeEvent, ChangeTransport, ConnectionStatus, SubscriptionManager, WatchSet,
};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// A query the view re-runs on every change to its watched tables.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Output: Clone + Default + std::fmt::Debug + Send + Sync + 'static;

    fn watch_set(&self) -> WatchSet;

    async fn fetch(&self, store: &dyn RecordStore) -> Result<Self::Output>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub data: T,
    /// True only until the first fetch finishes.
    pub loading: bool,
    /// Error from the most recent fetch; cleared by the next success.
    pub last_error: Option<String>,
    /// Completed fetches, successful or not.
    pub refreshes: u64,
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            data: T::default(),
            loading: true,
            last_error: None,
            refreshes: 0,
        }
    }
}

/// Must be mounted from within a tokio runtime.
pub struct LiveView<F: Fetcher> {
    manager: SubscriptionManager,
    watch_set: WatchSet,
    refresh: Arc<Notify>,
    snapshot_rx: watch::Receiver<Snapshot<F::Output>>,
    task: JoinHandle<()>,
}

impl<F: Fetcher> LiveView<F> {
    pub fn mount(
        fetcher: F,
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn ChangeTransport>,
    ) -> Self {
        let watch_set = fetcher.watch_set();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let refresh = Arc::new(Notify::new());
        let task = tokio::spawn(refresh_loop(fetcher, store, snapshot_tx, refresh.clone()));

        tracing::debug!(watch_key = %watch_set.key(), "mounting live view");
        let mut view = Self {
            manager: SubscriptionManager::new(transport),
            watch_set,
            refresh,
            snapshot_rx,
            task,
        };
        view.configure(true);
        view
    }

    /// Attach or detach the change feed. Re-enabling schedules a refetch so
    /// writes made while detached are picked up.
    pub fn set_enabled(&mut self, enabled: bool) -> ConnectionStatus {
        let was_enabled = self.manager.is_enabled();
        let status = self.configure(enabled);
        if enabled && !was_enabled {
            self.refresh.notify_one();
        }
        status
    }

    fn configure(&mut self, enabled: bool) -> ConnectionStatus {
        let refresh = self.refresh.clone();
        self.manager.configure(
            self.watch_set.clone(),
            move |_event: &ChangeEvent| {
                refresh.notify_one();
                Ok(())
            },
            enabled,
        )
    }

    /// Request a refetch outside of the change feed.
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn snapshot(&self) -> Snapshot<F::Output> {
        self.snapshot_rx.borrow().clone()
    }

    pub fn data(&self) -> F::Output {
        self.snapshot_rx.borrow().data.clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.status_receiver()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<F::Output>> {
        self.snapshot_rx.clone()
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    /// Wait for the next published snapshot.
    pub async fn changed(&mut self) -> Option<Snapshot<F::Output>> {
        self.snapshot_rx.changed().await.ok()?;
        Some(self.snapshot_rx.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&Snapshot<F::Output>) -> bool,
    ) -> Option<Snapshot<F::Output>> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx.wait_for(|s| predicate(s)).await.ok()?;
        Some(snapshot.clone())
    }
}

impl<F: Fetcher> Drop for LiveView<F> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<F: Fetcher> std::fmt::Debug for LiveView<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView")
            .field("watch_set", &self.watch_set)
            .field("manager", &self.manager)
            .finish()
    }
}

async fn refresh_loop<F: Fetcher>(
    fetcher: F,
    store: Arc<dyn RecordStore>,
    snapshot_tx: watch::Sender<Snapshot<F::Output>>,
    refresh: Arc<Notify>,
) {
    let watch_key = fetcher.watch_set().key();
    loop {
        match fetcher.fetch(store.as_ref()).await {
            Ok(data) => snapshot_tx.send_modify(|s| {
                s.data = data;
                s.loading = false;
                s.last_error = None;
                s.refreshes += 1;
            }),
            Err(e) => {
                tracing::warn!(
                    watch_key = %watch_key,
                    error = %e,
                    "live view fetch failed, keeping previous data"
                );
                snapshot_tx.send_modify(|s| {
                    s.loading = false;
                    s.last_error = Some(e.to_string());
                    s.refreshes += 1;
                });
            }
        }

        refresh.notified().await;
        if snapshot_tx.is_closed() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use pipeline_realtime::MemoryTransport;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        type Output = usize;

        fn watch_set(&self) -> WatchSet {
            WatchSet::from("applications")
        }

        async fn fetch(&self, _store: &dyn RecordStore) -> Result<usize> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("down".into()));
            }
            Ok(n)
        }
    }

    fn mount() -> (LiveView<CountingFetcher>, MemoryTransport, Arc<AtomicBool>) {
        let transport = MemoryTransport::auto_confirming();
        let fail = Arc::new(AtomicBool::new(false));
        let fetcher = CountingFetcher {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: fail.clone(),
        };
        let view = LiveView::mount(
            fetcher,
            Arc::new(MemoryStore::new()),
            Arc::new(transport.clone()),
        );
        (view, transport, fail)
    }

    async fn settle<F: Fetcher>(view: &LiveView<F>, refreshes: u64) -> Snapshot<F::Output> {
        tokio::time::timeout(
            Duration::from_secs(2),
            view.wait_for(|s| s.refreshes >= refreshes),
        )
        .await
            .expect("timed out waiting for refresh")
            .expect("snapshot channel closed")
    }

    #[tokio::test]
    async fn test_first_fetch_clears_loading() {
        let (view, _transport, _fail) = mount();
        assert_eq!(view.connection_status(), ConnectionStatus::Connected);

        let snapshot = settle(&view, 1).await;
        assert!(!snapshot.loading);
        assert_eq!(snapshot.data, 1);
    }

    #[tokio::test]
    async fn test_change_event_triggers_refetch() {
        let (view, transport, _fail) = mount();
        settle(&view, 1).await;

        transport.emit(ChangeEvent::insert("applications", serde_json::json!({})));
        let snapshot = settle(&view, 2).await;
        assert_eq!(snapshot.data, 2);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_data() {
        let (view, _transport, fail) = mount();
        settle(&view, 1).await;

        fail.store(true, Ordering::SeqCst);
        view.refresh();
        let snapshot = settle(&view, 2).await;
        assert_eq!(snapshot.data, 1);
        assert!(snapshot.last_error.is_some());
        assert_eq!(view.connection_status(), ConnectionStatus::Connected);

        fail.store(false, Ordering::SeqCst);
        view.refresh();
        let snapshot = settle(&view, 3).await;
        assert_eq!(snapshot.data, 3);
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn test_disabled_view_ignores_changes() {
        let (mut view, transport, _fail) = mount();
        settle(&view, 1).await;

        assert_eq!(view.set_enabled(false), ConnectionStatus::Disconnected);
        assert_eq!(
            transport.emit(ChangeEvent::insert("applications", serde_json::json!({}))),
            0
        );

        view.set_enabled(true);
        let snapshot = settle(&view, 2).await;
        assert_eq!(snapshot.data, 2);
        assert_eq!(view.connection_status(), ConnectionStatus::Connected);
    }
}
