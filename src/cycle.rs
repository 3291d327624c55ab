// ABOUTME: ExtractionCycle - one poll of the incremental extraction state machine
// ABOUTME: Reads rows past the watermark and advances it from the same snapshot

use std::fmt;

use crate::engine::{QueryEngine, Row};
use crate::error::CycleError;
use crate::query::{extract_max_value, QueryRewriter};
use crate::watermark::{Watermark, WatermarkStore};

/// Where a cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Building,
    ExecutingRows,
    ExecutingMax,
    Persisting,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Building => "building",
            CycleState::ExecutingRows => "executing-rows",
            CycleState::ExecutingMax => "executing-max",
            CycleState::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// Drives extraction cycles for one job.
///
/// Owns its store: one cycle, one watermark location. Cycles must be run
/// one after another, never concurrently.
pub struct ExtractionCycle<E> {
    engine: E,
    rewriter: QueryRewriter,
    store: WatermarkStore,
    state: CycleState,
    cycles: u64,
}

impl<E: QueryEngine> ExtractionCycle<E> {
    pub fn new(engine: E, rewriter: QueryRewriter, store: WatermarkStore) -> Self {
        Self {
            engine,
            rewriter,
            store,
            state: CycleState::Idle,
            cycles: 0,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Number of cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// The watermark value as last seen by this job's store.
    pub fn current_watermark(&self) -> Option<String> {
        self.store.current().value.clone()
    }

    pub fn watermark(&self) -> &Watermark {
        self.store.current()
    }

    /// The most recently built row query, for diagnostics.
    pub fn current_query_text(&self) -> String {
        self.rewriter.current_query_text()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run one cycle, returning the new rows.
    ///
    /// Failures are logged and reported as an empty batch; the stored
    /// watermark is left exactly as it was, so the next call retries.
    pub async fn poll_once(&mut self) -> Vec<Row> {
        match self.try_poll_once().await {
            Ok(rows) => rows,
            Err(e) => {
                if e.is_state_corruption() {
                    tracing::error!(
                        "Extraction cycle {} halted on watermark state that needs operator attention: {:?}",
                        self.cycles,
                        e
                    );
                } else {
                    tracing::error!(
                        "Extraction cycle {} failed for query {}: {:?}",
                        self.cycles,
                        self.rewriter.current_query_text(),
                        e
                    );
                }
                Vec::new()
            }
        }
    }

    /// Run one cycle, surfacing the cause of any failure.
    pub async fn try_poll_once(&mut self) -> Result<Vec<Row>, CycleError> {
        self.cycles += 1;
        let result = self.run_cycle().await;
        self.transition(CycleState::Idle);
        result
    }

    async fn run_cycle(&mut self) -> Result<Vec<Row>, CycleError> {
        self.transition(CycleState::Building);
        let previous = if self.rewriter.is_constrained() {
            self.store.retrieve().await?
        } else {
            None
        };
        let row_plan = self.rewriter.build_row_plan(previous.as_deref());
        tracing::debug!("Row plan for cycle {}: {}", self.cycles, row_plan);

        self.transition(CycleState::ExecutingRows);
        let result = self
            .engine
            .execute(&row_plan, None)
            .await
            .map_err(|source| CycleError::Execution {
                query: row_plan.to_query_text(),
                source,
            })?;
        let rows = result.rows;

        if rows.is_empty() {
            tracing::debug!(
                "No new rows in cycle {} (watermark {:?})",
                self.cycles,
                previous
            );
            return Ok(rows);
        }

        let Some(max_plan) = self.rewriter.build_max_value_plan() else {
            tracing::debug!(
                "Cycle {} returned {} rows from an unconstrained query",
                self.cycles,
                rows.len()
            );
            return Ok(rows);
        };

        self.transition(CycleState::ExecutingMax);
        tracing::debug!(
            "Max-value plan for cycle {} at {}: {}",
            self.cycles,
            result.token,
            max_plan
        );
        let max_result = self
            .engine
            .execute(&max_plan, Some(result.token))
            .await
            .map_err(|source| CycleError::Execution {
                query: max_plan.to_query_text(),
                source,
            })?;
        let new_value =
            extract_max_value(&max_result.rows).map_err(|source| CycleError::MalformedMaxValue {
                query: max_plan.to_query_text(),
                source,
            })?;

        self.transition(CycleState::Persisting);
        self.store.store(&new_value, rows.len() as u64).await?;

        tracing::info!(
            "Cycle {} read {} rows, watermark {:?} -> {}",
            self.cycles,
            rows.len(),
            previous,
            new_value
        );
        Ok(rows)
    }

    fn transition(&mut self, next: CycleState) {
        if self.state != next {
            tracing::debug!("Cycle {}: {} -> {}", self.cycles, self.state, next);
            self.state = next;
        }
    }
}
