// ABOUTME: Query-execution engine boundary - plans in, rows plus a point-in-time token out
// ABOUTME: Rows stay opaque apart from reading a named field as text

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::EngineError;
use crate::query::Plan;

/// Opaque snapshot marker returned by the engine with every result.
///
/// Passing it back to [`QueryEngine::execute`] pins the query to the same
/// database state that produced the earlier result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointInTime(u64);

impl PointInTime {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PointInTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PointInTime {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A single result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Read a field as text.
    ///
    /// Typed cell envelopes of the form `{"type": "xs:integer", "value": 3}`
    /// are unwrapped. Strings come back verbatim, numbers and booleans in
    /// their JSON rendering. Null, arrays and objects yield `None`.
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.0.get(name).and_then(scalar_text)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(cell) => cell.get("value").and_then(scalar_text),
        Value::Null | Value::Array(_) => None,
    }
}

/// Rows returned by one plan execution, with the snapshot they were read at.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub token: PointInTime,
}

/// Executes query plans.
///
/// When `at` is `Some`, the engine must evaluate the plan against the
/// snapshot identified by that token.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(&self, plan: &Plan, at: Option<PointInTime>) -> Result<QueryResult, EngineError>;
}

#[async_trait]
impl<T: QueryEngine + ?Sized> QueryEngine for Arc<T> {
    async fn execute(&self, plan: &Plan, at: Option<PointInTime>) -> Result<QueryResult, EngineError> {
        (**self).execute(plan, at).await
    }
}
