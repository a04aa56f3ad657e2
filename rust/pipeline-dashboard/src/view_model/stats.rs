use super::{Fetcher, LiveView};
use crate::error::Result;
use crate::model::{APPLICATIONS, APPLICATION_STEPS, COMPLETED_STEP};
use crate::store::{Filter, RecordStore};
use async_trait::async_trait;
use pipeline_realtime::WatchSet;
use serde::Serialize;

/// Headline counts over `applications`, bucketed by `current_step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: u64,
    pub completed: u64,
    pub in_progress: u64,
    pub pending: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsFetcher;

impl StatsFetcher {
    pub fn completed_filter() -> Filter {
        Filter::all().eq("current_step", COMPLETED_STEP)
    }

    pub fn in_progress_filter() -> Filter {
        Filter::all()
            .gt("current_step", 0)
            .lt("current_step", COMPLETED_STEP)
    }

    pub fn pending_filter() -> Filter {
        Filter::all().eq("current_step", 0)
    }
}

#[async_trait]
impl Fetcher for StatsFetcher {
    type Output = Stats;

    fn watch_set(&self) -> WatchSet {
        WatchSet::from([APPLICATIONS, APPLICATION_STEPS])
    }

    async fn fetch(&self, store: &dyn RecordStore) -> Result<Stats> {
        let all = Filter::all();
        let completed = Self::completed_filter();
        let in_progress = Self::in_progress_filter();
        let pending = Self::pending_filter();

        let (total, completed, in_progress, pending) = tokio::try_join!(
            store.count(APPLICATIONS, &all),
            store.count(APPLICATIONS, &completed),
            store.count(APPLICATIONS, &in_progress),
            store.count(APPLICATIONS, &pending),
        )?;

        Ok(Stats {
            total,
            completed,
            in_progress,
            pending,
        })
    }
}

pub type DashboardStats = LiveView<StatsFetcher>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_stats_buckets() {
        let store = MemoryStore::new();
        let rows = [0, 0, 1, 5, 6, 7, 8]
            .iter()
            .map(|step| json!({"current_step": step}))
            .collect();
        store.insert(APPLICATIONS, rows).await.unwrap();

        let stats = StatsFetcher.fetch(&store).await.unwrap();
        assert_eq!(
            stats,
            Stats {
                total: 7,
                completed: 1,
                in_progress: 2,
                pending: 2,
            }
        );
    }

    #[test]
    fn test_stats_watch_both_tables() {
        assert_eq!(
            StatsFetcher.watch_set().key().as_str(),
            "applications_application_steps"
        );
    }
}
