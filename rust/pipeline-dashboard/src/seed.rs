//! Synthetic applications for exercising the live views end to end.

use crate::error::{Result, StoreError};
use crate::model::{StepStatus, APPLICATIONS, APPLICATION_STEPS, FINAL_STEP, PIPELINE_STEPS};
use crate::store::{Filter, Query, RecordStore};
use chrono::Utc;
use serde_json::{json, Value};

/// Insert an application at step 0 with every pipeline step pending.
/// Returns the new application's id.
pub async fn create_test_application(store: &dyn RecordStore) -> Result<String> {
    let now = Utc::now();
    let stamp = now.timestamp_millis();
    let inserted = store
        .insert(
            APPLICATIONS,
            vec![json!({
                "candidate_name": format!("Test User {}", stamp),
                "candidate_email": format!("test{}@example.com", stamp),
                "position": "Test Position",
                "applied_at": now.to_rfc3339(),
                "current_step": 0,
            })],
        )
        .await?;

    let id = inserted
        .first()
        .and_then(|row| row.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidResponse("insert returned no application id".into()))?;

    let steps = PIPELINE_STEPS
        .iter()
        .enumerate()
        .map(|(index, (_, name))| {
            json!({
                "application_id": id,
                "step_name": name,
                "step_order": index + 1,
                "status": StepStatus::Pending,
            })
        })
        .collect();
    store.insert(APPLICATION_STEPS, steps).await?;

    tracing::info!(application_id = %id, "test application created");
    Ok(id)
}

/// Move an application to step 2: step 1 completed, step 2 in progress.
pub async fn update_test_application(store: &dyn RecordStore, id: &str) -> Result<()> {
    let updated = store
        .update(
            APPLICATIONS,
            &Filter::all().eq("id", id),
            json!({"current_step": 2}),
        )
        .await?;
    if updated.is_empty() {
        return Err(not_found(id));
    }

    set_step(store, id, 1, StepStatus::Completed).await?;
    set_step(store, id, 2, StepStatus::InProgress).await?;

    tracing::info!(application_id = %id, "test application updated");
    Ok(())
}

/// Complete the current step and start the next one. The final step is
/// marked completed as soon as it is reached. Returns the new
/// `current_step`; an application already at the final step is left alone.
pub async fn advance_test_application(store: &dyn RecordStore, id: &str) -> Result<i64> {
    let rows = store
        .select(
            APPLICATIONS,
            &Query::new()
                .filter(Filter::all().eq("id", id))
                .columns("current_step"),
        )
        .await?;
    let current = rows
        .first()
        .ok_or_else(|| not_found(id))?
        .get("current_step")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if current >= FINAL_STEP {
        tracing::debug!(application_id = %id, "application already at the final step");
        return Ok(current);
    }

    let next = current + 1;
    if current > 0 {
        set_step(store, id, current, StepStatus::Completed).await?;
    }
    let next_status = if next == FINAL_STEP {
        StepStatus::Completed
    } else {
        StepStatus::InProgress
    };
    set_step(store, id, next, next_status).await?;

    store
        .update(
            APPLICATIONS,
            &Filter::all().eq("id", id),
            json!({"current_step": next}),
        )
        .await?;

    tracing::info!(application_id = %id, step = next, "test application advanced");
    Ok(next)
}

async fn set_step(
    store: &dyn RecordStore,
    id: &str,
    order: i64,
    status: StepStatus,
) -> Result<()> {
    let mut patch = json!({"status": status});
    if status == StepStatus::Completed {
        patch["completed_at"] = json!(Utc::now().to_rfc3339());
    }
    store
        .update(
            APPLICATION_STEPS,
            &Filter::all().eq("application_id", id).eq("step_order", order),
            patch,
        )
        .await?;
    Ok(())
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        resource: APPLICATIONS.to_string(),
        id: id.to_string(),
    }
}
