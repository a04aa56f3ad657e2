use super::{Fetcher, LiveView};
use crate::error::Result;
use crate::model::{
    decode_rows, Application, ApplicationRow, ApplicationStepRow, APPLICATIONS, APPLICATION_STEPS,
};
use crate::store::{Query, RecordStore};
use async_trait::async_trait;
use pipeline_realtime::WatchSet;

/// Every application, newest first, with its steps in pipeline order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridFetcher;

#[async_trait]
impl Fetcher for GridFetcher {
    type Output = Vec<Application>;

    fn watch_set(&self) -> WatchSet {
        WatchSet::from([APPLICATIONS, APPLICATION_STEPS])
    }

    async fn fetch(&self, store: &dyn RecordStore) -> Result<Vec<Application>> {
        let applications = Query::new().order("applied_at", false);
        let steps = Query::new().order("step_order", true);
        let (applications, steps) = tokio::try_join!(
            store.select(APPLICATIONS, &applications),
            store.select(APPLICATION_STEPS, &steps),
        )?;

        let applications: Vec<ApplicationRow> = decode_rows(APPLICATIONS, applications)?;
        let steps: Vec<ApplicationStepRow> = decode_rows(APPLICATION_STEPS, steps)?;

        Ok(applications
            .into_iter()
            .map(|row| Application::from_rows(row, &steps))
            .collect())
    }
}

pub type ApplicationsGrid = LiveView<GridFetcher>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::model::StepStatus;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn application(id: &str, applied_at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "candidate_name": format!("Candidate {id}"),
            "candidate_email": format!("{id}@example.com"),
            "position": "Engineer",
            "applied_at": applied_at,
            "current_step": 1,
        })
    }

    #[tokio::test]
    async fn test_grid_orders_applications_and_steps() {
        let store = MemoryStore::new();
        store
            .insert(
                APPLICATIONS,
                vec![
                    application("old", "2024-01-01T00:00:00Z"),
                    application("new", "2024-03-01T00:00:00Z"),
                ],
            )
            .await
            .unwrap();
        store
            .insert(
                APPLICATION_STEPS,
                vec![
                    json!({"application_id": "new", "step_name": "Attachment Downloaded", "step_order": 2, "status": "in-progress"}),
                    json!({"application_id": "new", "step_name": "Email Received", "step_order": 1, "status": "completed"}),
                    json!({"application_id": "old", "step_name": "Email Received", "step_order": 1}),
                ],
            )
            .await
            .unwrap();

        let grid = GridFetcher.fetch(&store).await.unwrap();
        let ids: Vec<&str> = grid.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let statuses: Vec<StepStatus> = grid[0].steps.iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Completed, StepStatus::InProgress]);
        assert_eq!(grid[1].steps.len(), 1);
        assert_eq!(grid[1].steps[0].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_grid_rejects_malformed_rows() {
        let store = MemoryStore::new();
        store
            .insert(APPLICATIONS, vec![json!({"candidate_name": 5})])
            .await
            .unwrap();

        let err = GridFetcher.fetch(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRow { .. }));
    }
}
