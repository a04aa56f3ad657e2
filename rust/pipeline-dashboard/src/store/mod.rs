//! Query interface to the backing store.
//!
//! Writes against a watched resource are expected to show up as change events
//! on the change feed; the store itself knows nothing about subscriptions.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, resource: &str, query: &Query) -> Result<Vec<Value>>;

    async fn count(&self, resource: &str, filter: &Filter) -> Result<u64>;

    /// Insert `rows` and return them as stored.
    async fn insert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Merge `patch` into every matching row and return the updated rows.
    async fn update(&self, resource: &str, filter: &Filter, patch: Value) -> Result<Vec<Value>>;

    /// Delete every matching row and return the deleted rows.
    async fn delete(&self, resource: &str, filter: &Filter) -> Result<Vec<Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
    NotNull,
}

impl Op {
    fn as_rest(&self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Neq => "neq",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::IsNull => "is",
            Op::NotNull => "not.is",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: Op,
    pub value: Value,
}

impl Condition {
    pub fn matches(&self, row: &Value) -> bool {
        let field = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            Op::IsNull => field.is_null(),
            Op::NotNull => !field.is_null(),
            Op::Eq => compare_values(field, &self.value) == Some(Ordering::Equal),
            Op::Neq => compare_values(field, &self.value) != Some(Ordering::Equal),
            Op::Gt => compare_values(field, &self.value) == Some(Ordering::Greater),
            Op::Gte => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Op::Lt => compare_values(field, &self.value) == Some(Ordering::Less),
            Op::Lte => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }

    /// `(column, "op.value")` in PostgREST syntax.
    pub fn to_rest_pair(&self) -> (String, String) {
        let value = match self.op {
            Op::IsNull | Op::NotNull => "null".to_string(),
            _ => match &self.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };
        (self.column.clone(), format!("{}.{}", self.op.as_rest(), value))
    }
}

/// Conjunction of column conditions. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    fn with(mut self, column: impl Into<String>, op: Op, value: Value) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op,
            value,
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Op::Eq, value.into())
    }

    pub fn neq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Op::Neq, value.into())
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Op::Gt, value.into())
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Op::Gte, value.into())
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Op::Lt, value.into())
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Op::Lte, value.into())
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.with(column, Op::IsNull, Value::Null)
    }

    pub fn not_null(self, column: impl Into<String>) -> Self {
        self.with(column, Op::NotNull, Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub order: Option<Order>,
    /// Comma-separated column list; `None` selects every column.
    pub columns: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }
}

/// Ordering between two JSON scalars of the same kind; `None` when they are
/// not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
