use crate::config::DashboardConfig;
use crate::error::Result;
use crate::reset::{reset_all, ResetReport};
use crate::seed;
use crate::store::RecordStore;
use crate::view_model::{ApplicationsGrid, DashboardStats, GridFetcher, LiveView, StatsFetcher};
use pipeline_realtime::{ChangeTransport, ConnectionStatus};
use std::sync::Arc;

/// The stats panel and the applications grid over one store and one change
/// feed. Each view holds its own subscription.
pub struct Dashboard {
    pub stats: DashboardStats,
    pub grid: ApplicationsGrid,
    store: Arc<dyn RecordStore>,
}

impl Dashboard {
    /// Must be called from within a tokio runtime.
    pub fn mount(store: Arc<dyn RecordStore>, transport: Arc<dyn ChangeTransport>) -> Self {
        Self {
            stats: LiveView::mount(StatsFetcher, store.clone(), transport.clone()),
            grid: LiveView::mount(GridFetcher, store.clone(), transport),
            store,
        }
    }

    /// Mount against the REST store and WebSocket change feed described by
    /// `config`.
    pub fn connect(config: &DashboardConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(config.rest_store());
        let transport: Arc<dyn ChangeTransport> = Arc::new(config.ws_transport()?);
        tracing::info!(url = %config.store_url, "mounting dashboard");
        Ok(Self::mount(store, transport))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.stats.set_enabled(enabled);
        self.grid.set_enabled(enabled);
    }

    /// `Connected` only when every view is connected, `Disconnected` if any
    /// view is, `Connecting` otherwise.
    pub fn connection_status(&self) -> ConnectionStatus {
        let statuses = [self.stats.connection_status(), self.grid.connection_status()];
        if statuses.iter().all(|s| *s == ConnectionStatus::Connected) {
            ConnectionStatus::Connected
        } else if statuses.contains(&ConnectionStatus::Disconnected) {
            ConnectionStatus::Disconnected
        } else {
            ConnectionStatus::Connecting
        }
    }

    pub async fn reset(&self) -> Result<ResetReport> {
        reset_all(self.store.as_ref()).await
    }

    pub async fn create_test_application(&self) -> Result<String> {
        seed::create_test_application(self.store.as_ref()).await
    }

    pub async fn update_test_application(&self, id: &str) -> Result<()> {
        seed::update_test_application(self.store.as_ref(), id).await
    }

    pub async fn advance_test_application(&self, id: &str) -> Result<i64> {
        seed::advance_test_application(self.store.as_ref(), id).await
    }
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("stats", &self.stats)
            .field("grid", &self.grid)
            .finish()
    }
}
