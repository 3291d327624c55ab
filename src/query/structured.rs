// ABOUTME: Serialized-plan rewriter - appends typed step objects to the plan's operator list
// ABOUTME: Watermark values travel as JSON string leaves, so no text splicing is involved

use serde_json::{json, Value};
use thiserror::Error;

use super::{Constraint, CONSTRAINT_ALIAS};

/// Root key of a serialized plan.
const PLAN_ROOT: &str = "$optic";

/// The base plan does not have the `{"$optic": {"args": [...]}}` shape.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid serialized plan: {0}")]
pub struct PlanShapeError(pub String);

/// Rewrites serialized query plans.
#[derive(Debug, Clone)]
pub struct StructuredRewriter {
    base: Value,
    constraint: Option<Constraint>,
    /// The most recent row plan (the base plan until one is built).
    current: Value,
}

impl StructuredRewriter {
    /// Validate the base plan's shape and build a rewriter over it.
    pub fn new(base: Value, constraint: Option<Constraint>) -> Result<Self, PlanShapeError> {
        validate_shape(&base)?;
        Ok(Self {
            current: base.clone(),
            base,
            constraint,
        })
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn base(&self) -> &Value {
        &self.base
    }

    /// Append `where(gt(col, "<previous>"))`, `order-by(asc(col))` and an
    /// optional `limit(n)` to a copy of the base plan.
    pub fn build_row_plan(&mut self, previous: Option<&str>) -> Value {
        let mut plan = self.base.clone();
        if let Some(constraint) = &self.constraint {
            let column = constraint.column();
            let mut steps = Vec::with_capacity(3);
            if let Some(value) = previous {
                steps.push(op(
                    "where",
                    vec![op("gt", vec![col(column), Value::String(value.to_string())])],
                ));
            }
            steps.push(op("order-by", vec![op("asc", vec![col(column)])]));
            if let Some(limit) = constraint.row_limit() {
                steps.push(op("limit", vec![json!(limit)]));
            }
            append_steps(&mut plan, steps);
        }
        self.current = plan.clone();
        plan
    }

    /// Clone the current row plan and append `order-by(desc(col))`,
    /// `limit(1)` and `select([as("constraint", col)])`.
    pub fn build_max_value_plan(&self) -> Option<Value> {
        let constraint = self.constraint.as_ref()?;
        let column = constraint.column();

        let mut plan = self.current.clone();
        append_steps(
            &mut plan,
            vec![
                op("order-by", vec![op("desc", vec![col(column)])]),
                op("limit", vec![json!(1)]),
                op(
                    "select",
                    vec![Value::Array(vec![op(
                        "as",
                        vec![Value::String(CONSTRAINT_ALIAS.to_string()), col(column)],
                    )])],
                ),
            ],
        );
        Some(plan)
    }

    pub fn current_query_text(&self) -> String {
        self.current.to_string()
    }
}

fn op(name: &str, args: Vec<Value>) -> Value {
    json!({ "ns": "op", "fn": name, "args": args })
}

fn col(column: &str) -> Value {
    op("col", vec![Value::String(column.to_string())])
}

fn steps_mut(plan: &mut Value) -> Option<&mut Vec<Value>> {
    plan.get_mut(PLAN_ROOT)?.get_mut("args")?.as_array_mut()
}

fn append_steps(plan: &mut Value, steps: Vec<Value>) {
    // Shape is checked in `StructuredRewriter::new`.
    if let Some(existing) = steps_mut(plan) {
        existing.extend(steps);
    }
}

fn validate_shape(plan: &Value) -> Result<(), PlanShapeError> {
    let root = plan
        .as_object()
        .ok_or_else(|| PlanShapeError("plan must be a JSON object".to_string()))?;
    let operators = root
        .get(PLAN_ROOT)
        .and_then(Value::as_object)
        .ok_or_else(|| PlanShapeError(format!("missing '{}' object at the root", PLAN_ROOT)))?;
    let args = operators
        .get("args")
        .and_then(Value::as_array)
        .ok_or_else(|| PlanShapeError(format!("'{}' has no 'args' array", PLAN_ROOT)))?;
    if let Some(position) = args.iter().position(|step| !step.is_object()) {
        return Err(PlanShapeError(format!(
            "step {} of '{}.args' is not an object",
            position, PLAN_ROOT
        )));
    }
    Ok(())
}
