// ABOUTME: Textual pipeline-query rewriter - appends where/orderBy/limit steps to query text
// ABOUTME: The base text is never parsed; appended steps are rendered from a typed list

use std::fmt;

use super::{Constraint, CONSTRAINT_ALIAS};
use crate::sanitize::sanitize;

/// Sort direction for an `orderBy` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// A step appended to the end of the base pipeline.
///
/// Column names and values are sanitized when the step is built, so
/// rendering never needs to escape anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStep {
    /// `.where(op.gt(op.col('<column>'), '<value>'))`
    GreaterThan { column: String, value: String },
    /// `.orderBy(op.<dir>(op.col('<column>')))`
    OrderBy { column: String, direction: Direction },
    /// `.limit(<n>)`
    Limit(u64),
    /// `.select(op.as('<alias>', op.col('<column>')))`
    SelectAs { alias: String, column: String },
}

impl PipelineStep {
    fn greater_than(column: &str, value: &str) -> Self {
        PipelineStep::GreaterThan {
            column: sanitize(column),
            value: sanitize(value),
        }
    }

    fn order_by(column: &str, direction: Direction) -> Self {
        PipelineStep::OrderBy {
            column: sanitize(column),
            direction,
        }
    }

    fn select_as(alias: &str, column: &str) -> Self {
        PipelineStep::SelectAs {
            alias: sanitize(alias),
            column: sanitize(column),
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::GreaterThan { column, value } => {
                write!(f, ".where(op.gt(op.col('{}'), '{}'))", column, value)
            }
            PipelineStep::OrderBy { column, direction } => {
                write!(f, ".orderBy(op.{}(op.col('{}')))", direction.as_str(), column)
            }
            PipelineStep::Limit(n) => write!(f, ".limit({})", n),
            PipelineStep::SelectAs { alias, column } => {
                write!(f, ".select(op.as('{}', op.col('{}')))", alias, column)
            }
        }
    }
}

/// Rewrites pipeline query text.
#[derive(Debug, Clone)]
pub struct TextualRewriter {
    base: String,
    constraint: Option<Constraint>,
    /// Steps appended to `base` by the most recent row plan.
    current: Vec<PipelineStep>,
}

impl TextualRewriter {
    pub fn new(base: impl Into<String>, constraint: Option<Constraint>) -> Self {
        Self {
            base: base.into(),
            constraint,
            current: Vec::new(),
        }
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Steps appended by the most recent row plan.
    pub fn current_steps(&self) -> &[PipelineStep] {
        &self.current
    }

    /// `<base>[.where(gt)].orderBy(asc)[.limit(n)]`, or the bare base query
    /// when no constraint column is configured.
    pub fn build_row_plan(&mut self, previous: Option<&str>) -> String {
        self.current = match &self.constraint {
            Some(constraint) => row_steps(constraint, previous),
            None => Vec::new(),
        };
        self.current_query_text()
    }

    /// `<current>.orderBy(desc).limit(1).select(as('constraint', col))`
    pub fn build_max_value_plan(&self) -> Option<String> {
        let constraint = self.constraint.as_ref()?;
        let column = constraint.column();

        let mut steps = self.current.clone();
        steps.push(PipelineStep::order_by(column, Direction::Descending));
        steps.push(PipelineStep::Limit(1));
        steps.push(PipelineStep::select_as(CONSTRAINT_ALIAS, column));
        Some(self.render(&steps))
    }

    pub fn current_query_text(&self) -> String {
        self.render(&self.current)
    }

    fn render(&self, steps: &[PipelineStep]) -> String {
        let mut text = self.base.trim_end().to_string();
        for step in steps {
            text.push_str(&step.to_string());
        }
        text
    }
}

fn row_steps(constraint: &Constraint, previous: Option<&str>) -> Vec<PipelineStep> {
    let column = constraint.column();
    let mut steps = Vec::with_capacity(3);
    if let Some(value) = previous {
        steps.push(PipelineStep::greater_than(column, value));
    }
    steps.push(PipelineStep::order_by(column, Direction::Ascending));
    if let Some(limit) = constraint.row_limit() {
        steps.push(PipelineStep::Limit(limit));
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "op.fromView('demo', 'authors')";

    fn rewriter(limit: Option<u64>) -> TextualRewriter {
        TextualRewriter::new(BASE, Constraint::new("ID", limit))
    }

    #[test]
    fn test_first_cycle_orders_without_where() {
        let mut r = rewriter(None);
        assert_eq!(
            r.build_row_plan(None),
            "op.fromView('demo', 'authors').orderBy(op.asc(op.col('ID')))"
        );
    }

    #[test]
    fn test_row_plan_with_watermark_and_limit() {
        let mut r = rewriter(Some(3));
        assert_eq!(
            r.build_row_plan(Some("6")),
            "op.fromView('demo', 'authors')\
             .where(op.gt(op.col('ID'), '6'))\
             .orderBy(op.asc(op.col('ID')))\
             .limit(3)"
        );
    }

    #[test]
    fn test_max_value_plan_extends_current_row_plan() {
        let mut r = rewriter(Some(3));
        r.build_row_plan(Some("6"));
        assert_eq!(
            r.build_max_value_plan().unwrap(),
            "op.fromView('demo', 'authors')\
             .where(op.gt(op.col('ID'), '6'))\
             .orderBy(op.asc(op.col('ID')))\
             .limit(3)\
             .orderBy(op.desc(op.col('ID')))\
             .limit(1)\
             .select(op.as('constraint', op.col('ID')))"
        );
    }

    #[test]
    fn test_max_value_plan_does_not_change_current_text() {
        let mut r = rewriter(None);
        let row_plan = r.build_row_plan(Some("1"));
        r.build_max_value_plan();
        assert_eq!(r.current_query_text(), row_plan);
    }

    #[test]
    fn test_watermark_quotes_are_stripped() {
        let mut r = rewriter(None);
        let plan = r.build_row_plan(Some("my 'odd' value"));
        assert!(plan.contains(".where(op.gt(op.col('ID'), 'my odd value'))"));
    }

    #[test]
    fn test_watermark_parentheses_are_stripped() {
        let mut r = rewriter(None);
        let plan = r.build_row_plan(Some("my (odd) value"));
        assert!(plan.contains("'my odd value'"));
    }

    #[test]
    fn test_breakout_value_cannot_add_steps() {
        let mut r = rewriter(None);
        let plan = r.build_row_plan(Some("0')).limit(0).where(op.gt(op.col('ID'), '0"));
        assert_eq!(plan.matches(".limit(").count(), 0);
        assert_eq!(plan.matches(".where(").count(), 1);
    }

    #[test]
    fn test_trailing_whitespace_in_base_is_trimmed() {
        let mut r = TextualRewriter::new("op.fromView('demo', 'authors')\n  ", Constraint::new("ID", None));
        assert!(r
            .build_row_plan(None)
            .starts_with("op.fromView('demo', 'authors').orderBy("));
    }

    #[test]
    fn test_current_steps_track_last_plan() {
        let mut r = rewriter(Some(5));
        r.build_row_plan(Some("10"));
        assert_eq!(r.current_steps().len(), 3);
        r.build_row_plan(None);
        assert_eq!(
            r.current_steps(),
            &[
                PipelineStep::OrderBy {
                    column: "ID".to_string(),
                    direction: Direction::Ascending
                },
                PipelineStep::Limit(5)
            ]
        );
    }
}
