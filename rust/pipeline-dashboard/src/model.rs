//! Rows of the recruiting pipeline tables and the views built from them.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const APPLICATIONS: &str = "applications";
pub const APPLICATION_STEPS: &str = "application_steps";

/// `current_step` value the dashboard counts as completed.
pub const COMPLETED_STEP: i64 = 6;

/// Number of steps in the pipeline; `current_step` never exceeds it.
pub const FINAL_STEP: i64 = 8;

/// `(slug, display name)` for every pipeline step, in order.
pub const PIPELINE_STEPS: [(&str, &str); 8] = [
    ("email-received", "Email Received"),
    ("attachment-downloaded", "Attachment Downloaded"),
    ("resume-parsing", "Resume Parsing"),
    ("resume-scoring", "Resume Scoring"),
    ("crm-update", "CRM Update"),
    ("candidate-contacted", "Candidate Contacted"),
    ("candidate-pre-qualified", "Candidate Pre-Qualified"),
    ("consultant-notified", "Consultant Notified"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    /// Badge text shown next to a step.
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Pending => "Pending",
            StepStatus::InProgress => "In Progress",
            StepStatus::Completed => "Done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRow {
    pub id: String,
    pub candidate_name: String,
    pub candidate_email: String,
    pub position: String,
    #[serde(default)]
    pub applied_at: Option<String>,
    #[serde(default)]
    pub current_step: i64,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStepRow {
    pub id: String,
    pub application_id: String,
    pub step_name: String,
    pub step_order: i64,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub completed_at: Option<String>,
}

pub(crate) fn decode_rows<T: for<'de> Deserialize<'de>>(
    resource: &str,
    rows: Vec<Value>,
) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| StoreError::InvalidRow {
                resource: resource.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStep {
    pub id: String,
    pub name: String,
    pub order: i64,
    pub status: StepStatus,
    pub completed_at: Option<String>,
}

impl From<ApplicationStepRow> for ApplicationStep {
    fn from(row: ApplicationStepRow) -> Self {
        Self {
            id: row.id,
            name: row.step_name,
            order: row.step_order,
            status: row.status,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Application {
    pub id: String,
    pub candidate_name: String,
    pub candidate_email: String,
    pub position: String,
    pub applied_at: Option<String>,
    pub current_step: i64,
    pub resume: Option<String>,
    pub steps: Vec<ApplicationStep>,
}

impl Application {
    /// Join an application row with its steps. Steps belonging to other
    /// applications are ignored; the rest are sorted by `step_order`.
    pub fn from_rows(row: ApplicationRow, steps: &[ApplicationStepRow]) -> Self {
        let mut steps: Vec<ApplicationStep> = steps
            .iter()
            .filter(|s| s.application_id == row.id)
            .cloned()
            .map(ApplicationStep::from)
            .collect();
        steps.sort_by_key(|s| s.order);

        Self {
            id: row.id,
            candidate_name: row.candidate_name,
            candidate_email: row.candidate_email,
            position: row.position,
            applied_at: row.applied_at,
            current_step: row.current_step,
            resume: row.resume,
            steps,
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.completed_steps() as f64 / self.steps.len() as f64 * 100.0
    }

    /// Uppercase first letter of each word of the candidate's name.
    pub fn initials(&self) -> String {
        self.candidate_name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.current_step == COMPLETED_STEP
    }
}

/// A message in a candidate conversation. Well-formed messages are JSON
/// `{"type": ..., "content": ...}` envelopes; anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConversationMessage {
    Structured {
        #[serde(rename = "type")]
        kind: String,
        content: String,
    },
    Opaque(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    content: Value,
}

impl ConversationMessage {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) => {
                let content = match envelope.content {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                ConversationMessage::Structured {
                    kind: envelope.kind,
                    content,
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "conversation message is not an envelope");
                ConversationMessage::Opaque(raw.to_string())
            }
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, ConversationMessage::Opaque(_))
    }

    pub fn content(&self) -> &str {
        match self {
            ConversationMessage::Structured { content, .. } => content,
            ConversationMessage::Opaque(text) => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(app: &str, order: i64, status: StepStatus) -> ApplicationStepRow {
        ApplicationStepRow {
            id: format!("{}-{}", app, order),
            application_id: app.to_string(),
            step_name: PIPELINE_STEPS[(order - 1) as usize].1.to_string(),
            step_order: order,
            status,
            completed_at: None,
        }
    }

    fn row(id: &str, name: &str) -> ApplicationRow {
        ApplicationRow {
            id: id.to_string(),
            candidate_name: name.to_string(),
            candidate_email: "ada@example.com".to_string(),
            position: "Engineer".to_string(),
            applied_at: None,
            current_step: 2,
            resume: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_from_rows_sorts_and_filters_steps() {
        let steps = vec![
            step("a", 3, StepStatus::Pending),
            step("b", 1, StepStatus::Completed),
            step("a", 1, StepStatus::Completed),
            step("a", 2, StepStatus::InProgress),
        ];
        let app = Application::from_rows(row("a", "Ada Lovelace"), &steps);

        let orders: Vec<i64> = app.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(app.completed_steps(), 1);
        assert!((app.progress_percentage() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_progress_without_steps_is_zero() {
        let app = Application::from_rows(row("a", "Ada"), &[]);
        assert_eq!(app.progress_percentage(), 0.0);
    }

    #[test]
    fn test_initials() {
        assert_eq!(Application::from_rows(row("a", "ada  lovelace"), &[]).initials(), "AL");
        assert_eq!(Application::from_rows(row("a", ""), &[]).initials(), "");
    }

    #[test]
    fn test_step_status_wire_format() {
        assert_eq!(json!(StepStatus::InProgress), json!("in-progress"));
        let parsed: StepStatus = serde_json::from_value(json!("completed")).unwrap();
        assert_eq!(parsed, StepStatus::Completed);
        assert_eq!(StepStatus::InProgress.label(), "In Progress");
        assert_eq!(StepStatus::Completed.label(), "Done");
    }

    #[test]
    fn test_decode_rows_reports_resource() {
        let err = decode_rows::<ApplicationRow>(APPLICATIONS, vec![json!({"id": 1})]).unwrap_err();
        match err {
            StoreError::InvalidRow { resource, .. } => assert_eq!(resource, APPLICATIONS),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_conversation_message_parsing() {
        let msg = ConversationMessage::parse(r#"{"type":"assistant","content":"Hello"}"#);
        assert_eq!(
            msg,
            ConversationMessage::Structured {
                kind: "assistant".to_string(),
                content: "Hello".to_string()
            }
        );

        let msg = ConversationMessage::parse("plain text reply");
        assert!(msg.is_opaque());
        assert_eq!(msg.content(), "plain text reply");

        assert!(ConversationMessage::parse(r#"{"content":"no type"}"#).is_opaque());
    }
}
