use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(format!("unknown change kind: {}", other)),
        }
    }
}

/// Which change kinds a table listener receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventMask {
    #[default]
    All,
    Only(ChangeKind),
}

impl EventMask {
    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            EventMask::All => true,
            EventMask::Only(k) => *k == kind,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            EventMask::All => "*",
            EventMask::Only(ChangeKind::Insert) => "INSERT",
            EventMask::Only(ChangeKind::Update) => "UPDATE",
            EventMask::Only(ChangeKind::Delete) => "DELETE",
        }
    }
}

/// A row-level change notification. The payload is carried as-is; nothing in
/// this crate interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "table")]
    pub resource: String,
    #[serde(default)]
    pub schema: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    pub fn new(resource: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            resource: resource.into(),
            schema: crate::config::DEFAULT_SCHEMA.to_string(),
            kind,
            record: None,
            old_record: None,
            commit_timestamp: None,
        }
    }

    pub fn insert(resource: impl Into<String>, record: serde_json::Value) -> Self {
        Self::new(resource, ChangeKind::Insert).with_record(record)
    }

    pub fn update(
        resource: impl Into<String>,
        old_record: serde_json::Value,
        record: serde_json::Value,
    ) -> Self {
        let mut event = Self::new(resource, ChangeKind::Update).with_record(record);
        event.old_record = Some(old_record);
        event
    }

    pub fn delete(resource: impl Into<String>, old_record: serde_json::Value) -> Self {
        let mut event = Self::new(resource, ChangeKind::Delete);
        event.old_record = Some(old_record);
        event
    }

    pub fn with_record(mut self, record: serde_json::Value) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_all_matches_everything() {
        assert!(EventMask::All.matches(ChangeKind::Insert));
        assert!(EventMask::All.matches(ChangeKind::Update));
        assert!(EventMask::All.matches(ChangeKind::Delete));
        assert!(!EventMask::Only(ChangeKind::Insert).matches(ChangeKind::Delete));
    }

    #[test]
    fn test_change_event_parse() {
        let json = json!({
            "schema": "public",
            "table": "applications",
            "commit_timestamp": "2025-06-01T10:00:00Z",
            "type": "UPDATE",
            "record": {"id": "a1", "current_step": 2},
            "old_record": {"id": "a1"}
        });

        let event: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.resource, "applications");
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.record.unwrap()["current_step"], 2);
    }

    #[test]
    fn test_change_kind_from_str() {
        assert_eq!("insert".parse::<ChangeKind>(), Ok(ChangeKind::Insert));
        assert!("truncate".parse::<ChangeKind>().is_err());
    }
}
