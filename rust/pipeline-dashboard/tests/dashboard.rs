use pipeline_dashboard::model::StepStatus;
use pipeline_dashboard::{Dashboard, MemoryStore, RecordStore, Snapshot, Stats};
use pipeline_realtime::{ConnectionStatus, MemoryTransport};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn mount() -> (Dashboard, MemoryTransport, MemoryStore) {
    let transport = MemoryTransport::auto_confirming();
    let store = MemoryStore::with_feed(transport.clone());
    let dashboard = Dashboard::mount(Arc::new(store.clone()), Arc::new(transport.clone()));
    (dashboard, transport, store)
}

async fn stats_where(
    dashboard: &Dashboard,
    predicate: impl FnMut(&Snapshot<Stats>) -> bool,
) -> Snapshot<Stats> {
    tokio::time::timeout(WAIT, dashboard.stats.wait_for(predicate))
        .await
        .expect("stats did not settle")
        .expect("stats view dropped")
}

#[tokio::test]
async fn test_dashboard_connects_and_loads_empty() {
    let (dashboard, transport, _store) = mount();

    assert_eq!(dashboard.connection_status(), ConnectionStatus::Connected);
    assert_eq!(transport.live_channels().len(), 2);

    let snapshot = stats_where(&dashboard, |s| !s.loading).await;
    assert_eq!(snapshot.data, Stats::default());
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_views_follow_seeded_writes() {
    let (dashboard, _transport, _store) = mount();
    stats_where(&dashboard, |s| !s.loading).await;

    let id = dashboard.create_test_application().await.unwrap();
    let snapshot = stats_where(&dashboard, |s| s.data.total == 1).await;
    assert_eq!(snapshot.data.pending, 1);

    dashboard.update_test_application(&id).await.unwrap();
    stats_where(&dashboard, |s| s.data.in_progress == 1 && s.data.pending == 0).await;

    let grid = tokio::time::timeout(
        WAIT,
        dashboard.grid.wait_for(|s| {
            s.data
                .first()
                .map(|app| app.current_step == 2 && app.steps.len() == 8)
                .unwrap_or(false)
        }),
    )
    .await
    .expect("grid did not settle")
    .expect("grid view dropped");
    assert_eq!(grid.data[0].steps[1].status, StepStatus::InProgress);

    for _ in 0..4 {
        dashboard.advance_test_application(&id).await.unwrap();
    }
    let snapshot = stats_where(&dashboard, |s| s.data.completed == 1).await;
    assert_eq!(snapshot.data.in_progress, 0);
}

#[tokio::test]
async fn test_reset_clears_views() {
    let (dashboard, _transport, store) = mount();
    dashboard.create_test_application().await.unwrap();
    dashboard.create_test_application().await.unwrap();
    stats_where(&dashboard, |s| s.data.total == 2).await;

    let report = dashboard.reset().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.applications_deleted, 2);

    stats_where(&dashboard, |s| s.data.total == 0).await;
    assert_eq!(
        store
            .count("application_steps", &pipeline_dashboard::Filter::all())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_store_outage_keeps_last_stats() {
    let (dashboard, _transport, store) = mount();
    dashboard.create_test_application().await.unwrap();
    let before = stats_where(&dashboard, |s| s.data.total == 1).await;

    store.set_offline(true);
    dashboard.stats.refresh();
    let during = stats_where(&dashboard, |s| s.last_error.is_some()).await;
    assert_eq!(during.data, before.data);
    assert_eq!(dashboard.connection_status(), ConnectionStatus::Connected);

    store.set_offline(false);
    dashboard.stats.refresh();
    let after = stats_where(&dashboard, |s| s.last_error.is_none()).await;
    assert_eq!(after.data.total, 1);
}

#[tokio::test]
async fn test_disabled_dashboard_stops_listening() {
    let (mut dashboard, transport, _store) = mount();
    stats_where(&dashboard, |s| !s.loading).await;

    dashboard.set_enabled(false);
    assert_eq!(dashboard.connection_status(), ConnectionStatus::Disconnected);
    assert!(transport.live_channels().is_empty());

    dashboard.create_test_application().await.unwrap();
    dashboard.set_enabled(true);
    assert_eq!(dashboard.connection_status(), ConnectionStatus::Connected);
    stats_where(&dashboard, |s| s.data.total == 1).await;
}
