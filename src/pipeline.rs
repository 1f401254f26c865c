//! Run loop: one fetch → transform → score → archive → persist cycle at a
//! time, repeated on a fixed interval.
//!
//! A failing stage ends its cycle, never the process. The next scheduled
//! cycle is the retry.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::archive::{ArchiveKey, ArchiveStamp, Archiver, Layer};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::feature_extractor::FeatureExtractor;
use crate::fetcher::TransactionFetcher;
use crate::metrics::PipelineMetrics;
use crate::models::inference::VerdictStage;
use crate::store::{to_rows, TransactionStore};

/// Where a cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Transforming,
    Scoring,
    Archiving(Layer),
    Persisting,
    /// Terminal for the given cycle, not for the process
    Failed(u64),
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Idle => f.write_str("idle"),
            CycleState::Fetching => f.write_str("fetching"),
            CycleState::Transforming => f.write_str("transforming"),
            CycleState::Scoring => f.write_str("scoring"),
            CycleState::Archiving(layer) => write!(f, "archiving_{}", layer),
            CycleState::Persisting => f.write_str("persisting"),
            CycleState::Failed(cycle) => write!(f, "failed({})", cycle),
        }
    }
}

/// Result of a completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub raw_key: ArchiveKey,
    pub silver_key: ArchiveKey,
    pub gold_key: ArchiveKey,
    pub rows: usize,
    pub frauds: usize,
    pub elapsed: Duration,
}

/// Why a cycle stopped
#[derive(Debug)]
pub struct CycleFailure {
    pub cycle: u64,
    /// State the cycle was in when the error surfaced
    pub stage: CycleState,
    pub error: PipelineError,
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle {} failed while {}: {}", self.cycle, self.stage, self.error)
    }
}

impl std::error::Error for CycleFailure {}

/// Totals returned by [`Pipeline::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: bool,
}

/// Process-wide handles shared by every cycle
pub struct RunContext {
    pub fetcher: TransactionFetcher,
    pub extractor: FeatureExtractor,
    pub verdicts: VerdictStage,
    pub archiver: Archiver,
    pub store: Arc<dyn TransactionStore>,
    pub metrics: Arc<PipelineMetrics>,
}

/// Sequential cycle runner
pub struct Pipeline {
    ctx: RunContext,
    config: PipelineConfig,
    state: CycleState,
}

impl Pipeline {
    pub fn new(ctx: RunContext, config: PipelineConfig) -> Self {
        Self {
            ctx,
            config,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    fn enter(&mut self, cycle: u64, state: CycleState) {
        debug!(cycle = cycle, state = %state, "Cycle state");
        self.state = state;
    }

    fn fail(&mut self, cycle: u64, error: PipelineError) -> CycleFailure {
        let failure = CycleFailure {
            cycle,
            stage: self.state,
            error,
        };
        self.state = CycleState::Failed(cycle);
        failure
    }

    /// Run one full cycle.
    ///
    /// Artifacts are archived raw → silver → gold under one stamp, and
    /// rows are inserted only after every earlier step succeeded.
    pub async fn run_cycle(&mut self, cycle: u64) -> Result<CycleReport, CycleFailure> {
        let start = Instant::now();
        let stamp = ArchiveStamp::now();
        self.ctx.metrics.record_cycle_start();

        self.enter(cycle, CycleState::Fetching);
        let raw = match self.ctx.fetcher.fetch().await {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(cycle, e)),
        };

        self.enter(cycle, CycleState::Archiving(Layer::Raw));
        let raw_key = match self.ctx.archiver.archive_raw(&raw, &stamp).await {
            Ok(key) => key,
            Err(e) => return Err(self.fail(cycle, e)),
        };

        self.enter(cycle, CycleState::Transforming);
        let features = match self.ctx.extractor.build(&raw) {
            Ok(features) => features,
            Err(e) => return Err(self.fail(cycle, e)),
        };

        self.enter(cycle, CycleState::Archiving(Layer::Silver));
        let silver_key = match self.ctx.archiver.archive_features(&features, &stamp).await {
            Ok(key) => key,
            Err(e) => return Err(self.fail(cycle, e)),
        };

        self.enter(cycle, CycleState::Scoring);
        let classified = match self.ctx.verdicts.score(&features).await {
            Ok(classified) => classified,
            Err(e) => return Err(self.fail(cycle, e)),
        };

        self.enter(cycle, CycleState::Archiving(Layer::Gold));
        let gold_key = match self.ctx.archiver.archive_verdicts(&classified, &stamp).await {
            Ok(key) => key,
            Err(e) => return Err(self.fail(cycle, e)),
        };

        self.enter(cycle, CycleState::Persisting);
        let rows = match to_rows(&raw, &classified) {
            Ok(rows) => rows,
            Err(e) => return Err(self.fail(cycle, e)),
        };
        if let Err(e) = self.ctx.store.insert(&rows).await {
            return Err(self.fail(cycle, e));
        }

        self.enter(cycle, CycleState::Idle);
        let frauds = classified.iter().filter(|r| r.is_fraud_verdict()).count();
        let elapsed = start.elapsed();
        self.ctx.metrics.record_success(elapsed, rows.len(), frauds);

        Ok(CycleReport {
            cycle,
            raw_key,
            silver_key,
            gold_key,
            rows: rows.len(),
            frauds,
            elapsed,
        })
    }

    /// Run cycles until `max_cycles` is reached or `cancel` fires.
    ///
    /// Cancellation is honoured between cycles and during the pause, never
    /// inside a cycle.
    pub async fn run(&mut self, cancel: CancellationToken) -> RunSummary {
        let mut summary = RunSummary::default();

        info!(
            max_cycles = ?self.config.max_cycles,
            interval_secs = self.config.interval_secs,
            backoff_secs = self.config.backoff_secs,
            "Starting pipeline loop"
        );

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if self.config.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            summary.cycles += 1;
            let cycle = summary.cycles;

            let pause = match self.run_cycle(cycle).await {
                Ok(report) => {
                    summary.succeeded += 1;
                    info!(
                        cycle = report.cycle,
                        rows = report.rows,
                        frauds = report.frauds,
                        gold_key = %report.gold_key,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Cycle completed"
                    );
                    if summary.succeeded % 10 == 0 {
                        let stats = self.ctx.metrics.get_cycle_stats();
                        info!(
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            mean_ms = stats.mean_ms,
                            "Processing milestone"
                        );
                    }
                    self.config.interval()
                }
                Err(failure) => {
                    summary.failed += 1;
                    self.ctx.metrics.record_failure(failure.error.kind());
                    error!(
                        cycle = failure.cycle,
                        stage = %failure.stage,
                        error_kind = failure.error.kind(),
                        error = %failure.error,
                        backoff_secs = self.config.backoff_secs,
                        "Cycle failed, waiting before next attempt"
                    );
                    self.config.backoff()
                }
            };
            self.state = CycleState::Idle;

            if self.config.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(
            cycles = summary.cycles,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Pipeline loop finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(CycleState::Fetching.to_string(), "fetching");
        assert_eq!(CycleState::Archiving(Layer::Silver).to_string(), "archiving_silver");
        assert_eq!(CycleState::Failed(3).to_string(), "failed(3)");
    }
}
