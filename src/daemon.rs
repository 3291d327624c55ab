// ABOUTME: ExtractionDaemon - runs extraction cycles on a fixed interval
// ABOUTME: Hands each non-empty batch to a handler and stops on a shutdown signal

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

use crate::cycle::ExtractionCycle;
use crate::engine::{QueryEngine, Row};

/// Configuration for the ExtractionDaemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Interval between extraction cycles
    pub poll_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Statistics from an extraction cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub rows: usize,
    pub watermark: Option<String>,
    pub duration_ms: u64,
}

/// Runs one job's extraction cycles back to back on an interval.
pub struct ExtractionDaemon<E> {
    cycle: ExtractionCycle<E>,
    config: DaemonConfig,
}

impl<E: QueryEngine> ExtractionDaemon<E> {
    pub fn new(cycle: ExtractionCycle<E>, config: DaemonConfig) -> Self {
        Self { cycle, config }
    }

    pub fn cycle(&self) -> &ExtractionCycle<E> {
        &self.cycle
    }

    /// Run a single cycle and report what it did.
    pub async fn run_once(&mut self) -> (Vec<Row>, CycleStats) {
        let start = Instant::now();
        let rows = self.cycle.poll_once().await;
        let stats = CycleStats {
            rows: rows.len(),
            watermark: self.cycle.current_watermark(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        (rows, stats)
    }

    /// Run cycles until a shutdown signal arrives.
    ///
    /// A cycle in progress is allowed to finish; shutdown is only observed
    /// between cycles. Handler errors stop the daemon.
    pub async fn run<H>(
        &mut self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
        mut handler: H,
    ) -> Result<()>
    where
        H: FnMut(Vec<Row>) -> Result<()>,
    {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Starting ExtractionDaemon with poll_interval={:?}",
            self.config.poll_interval
        );

        loop {
            tokio::select! {
                biased; // Check shutdown first

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping ExtractionDaemon");
                    break;
                }
                _ = ticker.tick() => {
                    let (rows, stats) = self.run_once().await;
                    let cycle = self.cycle.cycles();
                    if rows.is_empty() {
                        tracing::debug!("Cycle {} produced no rows in {}ms", cycle, stats.duration_ms);
                        continue;
                    }

                    tracing::info!(
                        "Cycle {} completed: {} rows in {}ms, watermark {:?}",
                        cycle,
                        stats.rows,
                        stats.duration_ms,
                        stats.watermark
                    );
                    handler(rows).with_context(|| format!("Failed to hand off rows from cycle {}", cycle))?;
                }
            }
        }

        Ok(())
    }
}
