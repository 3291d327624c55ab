// ABOUTME: Query rewriting - constrains a user query to rows past the watermark
// ABOUTME: Closed enum over the textual pipeline and serialized plan representations

pub mod max_value;
pub mod structured;
pub mod textual;

use serde_json::Value;
use std::fmt;

pub use max_value::extract_max_value;
pub use structured::{PlanShapeError, StructuredRewriter};
pub use textual::{Direction, PipelineStep, TextualRewriter};

/// Alias under which the max-value plan projects the constraint column.
pub const CONSTRAINT_ALIAS: &str = "constraint";

/// An executable query plan in one of the two supported representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Pipeline-style query text, e.g. `op.fromView('demo', 'authors').limit(10)`
    Dsl(String),
    /// Serialized plan tree rooted at `{"$optic": {...}}`
    Serialized(Value),
}

impl Plan {
    /// The plan as text, for logging and error messages.
    pub fn to_query_text(&self) -> String {
        match self {
            Plan::Dsl(text) => text.clone(),
            Plan::Serialized(tree) => tree.to_string(),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_text())
    }
}

/// The watermark column and the optional per-cycle row limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    column: String,
    row_limit: Option<u64>,
}

impl Constraint {
    /// Build a constraint, or `None` when the column is empty.
    ///
    /// An empty column name means "not configured". A row limit of zero
    /// means unlimited.
    pub fn new(column: impl Into<String>, row_limit: Option<u64>) -> Option<Self> {
        let column = column.into();
        if column.trim().is_empty() {
            return None;
        }
        Some(Self {
            column,
            row_limit: row_limit.filter(|limit| *limit > 0),
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }
}

/// Rewrites a base query into row plans and max-value plans.
///
/// Holds the most recently built row plan so the max-value plan is always
/// derived from exactly what was executed.
#[derive(Debug, Clone)]
pub enum QueryRewriter {
    Textual(TextualRewriter),
    Structured(StructuredRewriter),
}

impl QueryRewriter {
    pub fn textual(base: impl Into<String>, constraint: Option<Constraint>) -> Self {
        QueryRewriter::Textual(TextualRewriter::new(base, constraint))
    }

    pub fn structured(base: Value, constraint: Option<Constraint>) -> Result<Self, PlanShapeError> {
        Ok(QueryRewriter::Structured(StructuredRewriter::new(
            base, constraint,
        )?))
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        match self {
            QueryRewriter::Textual(r) => r.constraint(),
            QueryRewriter::Structured(r) => r.constraint(),
        }
    }

    /// Whether a constraint column is configured. Unconstrained rewriters
    /// return the base query from every call.
    pub fn is_constrained(&self) -> bool {
        self.constraint().is_some()
    }

    /// Build the row plan for this cycle and remember it as the current plan.
    pub fn build_row_plan(&mut self, previous: Option<&str>) -> Plan {
        match self {
            QueryRewriter::Textual(r) => Plan::Dsl(r.build_row_plan(previous)),
            QueryRewriter::Structured(r) => Plan::Serialized(r.build_row_plan(previous)),
        }
    }

    /// Build the plan that selects the highest constraint value from the
    /// current row plan. `None` when no constraint column is configured.
    pub fn build_max_value_plan(&self) -> Option<Plan> {
        match self {
            QueryRewriter::Textual(r) => r.build_max_value_plan().map(Plan::Dsl),
            QueryRewriter::Structured(r) => r.build_max_value_plan().map(Plan::Serialized),
        }
    }

    /// The as-executed row query, for diagnostics.
    pub fn current_query_text(&self) -> String {
        match self {
            QueryRewriter::Textual(r) => r.current_query_text(),
            QueryRewriter::Structured(r) => r.current_query_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constraint_empty_column_is_not_configured() {
        assert!(Constraint::new("", Some(10)).is_none());
        assert!(Constraint::new("   ", None).is_none());
        let c = Constraint::new("ID", Some(0)).unwrap();
        assert_eq!(c.column(), "ID");
        assert_eq!(c.row_limit(), None);
    }

    #[test]
    fn test_rewriter_dispatches_by_representation() {
        let mut textual = QueryRewriter::textual(
            "op.fromView('demo', 'authors')",
            Constraint::new("ID", Some(3)),
        );
        assert!(matches!(textual.build_row_plan(Some("3")), Plan::Dsl(_)));

        let base = json!({"$optic": {"ns": "op", "fn": "operators", "args": []}});
        let mut structured =
            QueryRewriter::structured(base, Constraint::new("ID", Some(3))).unwrap();
        assert!(matches!(
            structured.build_row_plan(Some("3")),
            Plan::Serialized(_)
        ));
    }

    #[test]
    fn test_idempotent_rewrite() {
        let mut rewriter = QueryRewriter::textual(
            "op.fromView('demo', 'authors')",
            Constraint::new("ID", Some(3)),
        );
        let first = rewriter.build_row_plan(Some("6"));
        let second = rewriter.build_row_plan(Some("6"));
        assert_eq!(first, second);

        let base = json!({"$optic": {"ns": "op", "fn": "operators", "args": [
            {"ns": "op", "fn": "from-view", "args": ["demo", "authors"]}
        ]}});
        let mut rewriter = QueryRewriter::structured(base, Constraint::new("ID", None)).unwrap();
        let first = rewriter.build_row_plan(Some("6"));
        let second = rewriter.build_row_plan(Some("6"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_unconstrained_rewriter_is_inert() {
        let mut rewriter = QueryRewriter::textual("op.fromView('demo', 'authors')", None);
        assert!(!rewriter.is_constrained());
        assert_eq!(
            rewriter.build_row_plan(Some("99")),
            Plan::Dsl("op.fromView('demo', 'authors')".to_string())
        );
        assert!(rewriter.build_max_value_plan().is_none());
    }

    #[test]
    fn test_plan_query_text() {
        let plan = Plan::Serialized(json!({"$optic": {"args": []}}));
        assert_eq!(plan.to_query_text(), r#"{"$optic":{"args":[]}}"#);
        assert_eq!(Plan::Dsl("op.x()".to_string()).to_string(), "op.x()");
    }
}
