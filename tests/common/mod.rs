// ABOUTME: Shared test helpers - an in-memory versioned table behind the QueryEngine trait
// ABOUTME: Interprets the steps appended to pipeline text and serialized plans

#![allow(dead_code)]

use async_trait::async_trait;
use highwater::{EngineError, Plan, PointInTime, QueryEngine, QueryResult, Row};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::Mutex;

pub const AUTHORS_DSL: &str = "op.fromView('demo', 'authors')";

pub fn authors_plan() -> Value {
    json!({"$optic": {"ns": "op", "fn": "operators", "args": [
        {"ns": "op", "fn": "from-view", "args": ["demo", "authors"]}
    ]}})
}

pub fn author(id: i64) -> Value {
    json!({"ID": id, "name": format!("author {}", id)})
}

/// A step the engine knows how to evaluate.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Greater { column: String, value: String },
    Order { column: String, descending: bool },
    Limit(usize),
    SelectAs { alias: String, column: String },
}

#[derive(Default)]
struct Table {
    version: u64,
    /// (version the row became visible at, row)
    rows: Vec<(u64, Map<String, Value>)>,
}

/// In-memory table with point-in-time reads.
///
/// Every insert creates a new version; an unpinned query sees the latest
/// version and reports it as its token.
#[derive(Default)]
pub struct MemoryEngine {
    table: Mutex<Table>,
    pending: Mutex<Option<Vec<Value>>>,
    failures: Mutex<u32>,
    executions: Mutex<Vec<(String, Option<PointInTime>)>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authors(ids: impl IntoIterator<Item = i64>) -> Self {
        let engine = Self::new();
        engine.insert(ids.into_iter().map(author).collect());
        engine
    }

    /// Commit rows as a new version.
    pub fn insert(&self, rows: Vec<Value>) {
        let mut table = self.table.lock().unwrap();
        table.version += 1;
        let version = table.version;
        for row in rows {
            if let Value::Object(fields) = row {
                table.rows.push((version, fields));
            }
        }
    }

    /// Commit `rows` right after the next query returns, simulating a
    /// writer racing the extraction cycle.
    pub fn insert_after_next_execute(&self, rows: Vec<Value>) {
        *self.pending.lock().unwrap() = Some(rows);
    }

    /// Fail the next `count` executions.
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock().unwrap() = count;
    }

    pub fn executions(&self) -> Vec<(String, Option<PointInTime>)> {
        self.executions.lock().unwrap().clone()
    }

    pub fn latest_token(&self) -> PointInTime {
        PointInTime::new(self.table.lock().unwrap().version)
    }

    fn evaluate(&self, steps: &[Step], at: Option<PointInTime>) -> QueryResult {
        let table = self.table.lock().unwrap();
        let token = at.map(|t| t.value()).unwrap_or(table.version);
        let mut rows: Vec<Map<String, Value>> = table
            .rows
            .iter()
            .filter(|(version, _)| *version <= token)
            .map(|(_, row)| row.clone())
            .collect();

        for step in steps {
            match step {
                Step::Greater { column, value } => rows.retain(|row| {
                    row.get(column)
                        .map(|cell| compare(&cell_text(cell), value) == Ordering::Greater)
                        .unwrap_or(false)
                }),
                Step::Order { column, descending } => rows.sort_by(|a, b| {
                    let ordering = compare(
                        &a.get(column).map(cell_text).unwrap_or_default(),
                        &b.get(column).map(cell_text).unwrap_or_default(),
                    );
                    if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                }),
                Step::Limit(n) => rows.truncate(*n),
                Step::SelectAs { alias, column } => {
                    rows = rows
                        .into_iter()
                        .map(|row| {
                            let mut projected = Map::new();
                            projected.insert(
                                alias.clone(),
                                row.get(column).cloned().unwrap_or(Value::Null),
                            );
                            projected
                        })
                        .collect()
                }
            }
        }

        QueryResult {
            rows: rows.into_iter().map(Row::new).collect(),
            token: PointInTime::new(token),
        }
    }
}

#[async_trait]
impl QueryEngine for MemoryEngine {
    async fn execute(&self, plan: &Plan, at: Option<PointInTime>) -> Result<QueryResult, EngineError> {
        self.executions
            .lock()
            .unwrap()
            .push((plan.to_query_text(), at));

        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(EngineError::Status {
                    status: 503,
                    body: "service unavailable".to_string(),
                });
            }
        }

        let steps = match plan {
            Plan::Dsl(text) => dsl_steps(text)?,
            Plan::Serialized(tree) => serialized_steps(tree)?,
        };
        let result = self.evaluate(&steps, at);

        if let Some(rows) = self.pending.lock().unwrap().take() {
            self.insert(rows);
        }
        Ok(result)
    }
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numbers compare numerically, everything else as text.
fn compare(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn decode_error(message: impl Into<String>) -> EngineError {
    EngineError::Decode(message.into())
}

/// Split `a.b(x.y('z')).c(1)` into top-level call segments.
fn split_calls(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            '.' if !quoted && depth == 0 => {
                segments.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(text[start..].trim());
    segments
}

/// Single-quoted literals in order of appearance.
fn quoted_literals(text: &str) -> Vec<String> {
    text.split('\'')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_string())
        .collect()
}

fn dsl_steps(text: &str) -> Result<Vec<Step>, EngineError> {
    let mut steps = Vec::new();
    for segment in split_calls(text) {
        let Some(open) = segment.find('(') else {
            continue;
        };
        let name = &segment[..open];
        let inner = segment[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| decode_error(format!("unbalanced call: {}", segment)))?;
        let literals = quoted_literals(inner);
        let step = match name {
            "where" => match literals.as_slice() {
                [column, value] if inner.starts_with("op.gt(") => Step::Greater {
                    column: column.clone(),
                    value: value.clone(),
                },
                _ => return Err(decode_error(format!("unsupported where: {}", inner))),
            },
            "orderBy" => Step::Order {
                column: literals
                    .first()
                    .cloned()
                    .ok_or_else(|| decode_error("orderBy without column"))?,
                descending: inner.starts_with("op.desc("),
            },
            "limit" => Step::Limit(
                inner
                    .trim()
                    .parse()
                    .map_err(|_| decode_error(format!("bad limit: {}", inner)))?,
            ),
            "select" => match literals.as_slice() {
                [alias, column] => Step::SelectAs {
                    alias: alias.clone(),
                    column: column.clone(),
                },
                _ => return Err(decode_error(format!("unsupported select: {}", inner))),
            },
            _ => continue,
        };
        steps.push(step);
    }
    Ok(steps)
}

fn column_of(col: &Value) -> Result<String, EngineError> {
    col["args"][0]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| decode_error(format!("not a column reference: {}", col)))
}

fn serialized_steps(tree: &Value) -> Result<Vec<Step>, EngineError> {
    let args = tree["$optic"]["args"]
        .as_array()
        .ok_or_else(|| decode_error("plan has no $optic.args"))?;
    let mut steps = Vec::new();
    for step in args {
        let args = &step["args"];
        let parsed = match step["fn"].as_str().unwrap_or_default() {
            "where" => {
                let gt = &args[0];
                if gt["fn"] != "gt" {
                    return Err(decode_error(format!("unsupported where: {}", gt)));
                }
                Step::Greater {
                    column: column_of(&gt["args"][0])?,
                    value: gt["args"][1]
                        .as_str()
                        .map(str::to_string)
                        .ok_or_else(|| decode_error("where value is not a string"))?,
                }
            }
            "order-by" => Step::Order {
                column: column_of(&args[0]["args"][0])?,
                descending: args[0]["fn"] == "desc",
            },
            "limit" => Step::Limit(
                args[0]
                    .as_u64()
                    .ok_or_else(|| decode_error("limit is not a number"))? as usize,
            ),
            "select" => {
                let alias = &args[0][0];
                Step::SelectAs {
                    alias: alias["args"][0]
                        .as_str()
                        .map(str::to_string)
                        .ok_or_else(|| decode_error("select alias is not a string"))?,
                    column: column_of(&alias["args"][1])?,
                }
            }
            _ => continue,
        };
        steps.push(parsed);
    }
    Ok(steps)
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .filter_map(|row| row.get("ID").and_then(Value::as_i64))
        .collect()
}
