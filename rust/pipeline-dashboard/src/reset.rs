//! Wipe every application and its steps.

use crate::error::Result;
use crate::model::{APPLICATIONS, APPLICATION_STEPS};
use crate::store::{Filter, RecordStore};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub steps_deleted: u64,
    pub applications_deleted: u64,
    pub steps_remaining: u64,
    pub applications_remaining: u64,
}

impl ResetReport {
    pub fn is_clean(&self) -> bool {
        self.steps_remaining == 0 && self.applications_remaining == 0
    }
}

/// Delete all steps, then all applications, then count what is left.
///
/// Steps go first so no step is ever left pointing at a missing application.
/// A failed delete aborts the reset and is returned as is.
pub async fn reset_all(store: &dyn RecordStore) -> Result<ResetReport> {
    let steps_before = store.count(APPLICATION_STEPS, &Filter::all()).await?;
    let applications_before = store.count(APPLICATIONS, &Filter::all()).await?;
    tracing::info!(
        steps = steps_before,
        applications = applications_before,
        "resetting pipeline data"
    );

    let steps_deleted = store.delete(APPLICATION_STEPS, &Filter::all()).await?.len() as u64;
    let applications_deleted = store.delete(APPLICATIONS, &Filter::all()).await?.len() as u64;

    let report = ResetReport {
        steps_deleted,
        applications_deleted,
        steps_remaining: store.count(APPLICATION_STEPS, &Filter::all()).await?,
        applications_remaining: store.count(APPLICATIONS, &Filter::all()).await?,
    };

    if report.is_clean() {
        tracing::info!(
            steps_deleted,
            applications_deleted,
            "pipeline data reset"
        );
    } else {
        tracing::warn!(
            steps_remaining = report.steps_remaining,
            applications_remaining = report.applications_remaining,
            "reset left rows behind"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::seed::create_test_application;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_reset_removes_everything() {
        let store = MemoryStore::new();
        create_test_application(&store).await.unwrap();
        create_test_application(&store).await.unwrap();

        let report = reset_all(&store).await.unwrap();
        assert_eq!(report.steps_deleted, 16);
        assert_eq!(report.applications_deleted, 2);
        assert!(report.is_clean());
        assert!(store.rows(APPLICATIONS).await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_of_empty_store_is_clean() {
        let report = reset_all(&MemoryStore::new()).await.unwrap();
        assert_eq!(report, ResetReport::default());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_reset_propagates_store_errors() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = reset_all(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
