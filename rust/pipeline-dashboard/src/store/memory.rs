use super::{compare_values, Filter, Query, RecordStore};
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use pipeline_realtime::{ChangeEvent, MemoryTransport};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process store that publishes its own writes on a [`MemoryTransport`].
///
/// Rows are JSON objects. Inserted rows get an `id` (UUID v4) and
/// `created_at`/`updated_at` timestamps unless the caller supplies them;
/// updates refresh `updated_at`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Value>>>>,
    feed: Option<MemoryTransport>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose writes are emitted as change events on `feed`.
    pub fn with_feed(feed: MemoryTransport) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    pub fn feed(&self) -> Option<&MemoryTransport> {
        self.feed.as_ref()
    }

    /// While offline every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    pub async fn rows(&self, resource: &str) -> Vec<Value> {
        self.tables
            .read()
            .await
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        if let Some(feed) = &self.feed {
            for event in events {
                let delivered = feed.emit(event);
                tracing::trace!(delivered, "memory store change published");
            }
        }
    }
}

fn object(resource: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidRow {
            resource: resource.to_string(),
            message: format!("expected a JSON object, got {}", other),
        }),
    }
}

fn project(row: &Value, columns: &Option<String>) -> Value {
    let Some(columns) = columns else {
        return row.clone();
    };
    let mut out = Map::new();
    for column in columns.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if column == "*" {
            return row.clone();
        }
        if let Some(value) = row.get(column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    Value::Object(out)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, resource: &str, query: &Query) -> Result<Vec<Value>> {
        self.check_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<Value> = tables
            .get(resource)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let a = a.get(&order.column).unwrap_or(&Value::Null);
                let b = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = compare_values(a, b).unwrap_or(Ordering::Equal);
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        Ok(rows.iter().map(|row| project(row, &query.columns)).collect())
    }

    async fn count(&self, resource: &str, filter: &Filter) -> Result<u64> {
        self.check_online()?;
        let tables = self.tables.read().await;
        let count = tables
            .get(resource)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn insert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        self.check_online()?;
        let now = Value::String(Utc::now().to_rfc3339());
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let mut map = object(resource, row)?;
            map.entry("id")
                .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
            map.entry("created_at").or_insert_with(|| now.clone());
            map.entry("updated_at").or_insert_with(|| now.clone());
            stored.push(Value::Object(map));
        }

        self.tables
            .write()
            .await
            .entry(resource.to_string())
            .or_default()
            .extend(stored.iter().cloned());

        tracing::debug!(resource, rows = stored.len(), "memory store insert");
        self.publish(
            stored
                .iter()
                .map(|row| ChangeEvent::insert(resource, row.clone()))
                .collect(),
        );
        Ok(stored)
    }

    async fn update(&self, resource: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        self.check_online()?;
        let patch = object(resource, patch)?;
        let now = Value::String(Utc::now().to_rfc3339());
        let mut events = Vec::new();
        let mut updated = Vec::new();

        {
            let mut tables = self.tables.write().await;
            if let Some(rows) = tables.get_mut(resource) {
                for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                    let old = row.clone();
                    if let Value::Object(map) = row {
                        for (column, value) in &patch {
                            map.insert(column.clone(), value.clone());
                        }
                        if !patch.contains_key("updated_at") {
                            map.insert("updated_at".to_string(), now.clone());
                        }
                    }
                    events.push(ChangeEvent::update(resource, old, row.clone()));
                    updated.push(row.clone());
                }
            }
        }

        tracing::debug!(resource, rows = updated.len(), "memory store update");
        self.publish(events);
        Ok(updated)
    }

    async fn delete(&self, resource: &str, filter: &Filter) -> Result<Vec<Value>> {
        self.check_online()?;
        let deleted: Vec<Value> = {
            let mut tables = self.tables.write().await;
            match tables.get_mut(resource) {
                Some(rows) => {
                    let (gone, kept): (Vec<Value>, Vec<Value>) =
                        rows.drain(..).partition(|row| filter.matches(row));
                    *rows = kept;
                    gone
                }
                None => Vec::new(),
            }
        };

        tracing::debug!(resource, rows = deleted.len(), "memory store delete");
        self.publish(
            deleted
                .iter()
                .map(|row| ChangeEvent::delete(resource, row.clone()))
                .collect(),
        );
        Ok(deleted)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("has_feed", &self.feed.is_some())
            .field("offline", &self.offline.load(AtomicOrdering::SeqCst))
            .finish()
    }
}
