//! Cycle statistics for the fraud scoring pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for pipeline cycles
pub struct PipelineMetrics {
    /// Cycles started
    pub cycles_started: AtomicU64,
    /// Cycles that persisted their rows
    pub cycles_succeeded: AtomicU64,
    /// Cycles that stopped at some stage
    pub cycles_failed: AtomicU64,
    /// Rows written to the relational store
    pub rows_persisted: AtomicU64,
    /// Rows the model classified as fraud
    pub fraud_verdicts: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Successful cycle durations (in milliseconds)
    cycle_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_succeeded: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            rows_persisted: AtomicU64::new(0),
            fraud_verdicts: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            cycle_times: RwLock::new(Vec::with_capacity(128)),
            start_time: Instant::now(),
        }
    }

    pub fn record_cycle_start(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed cycle
    pub fn record_success(&self, elapsed: Duration, rows: usize, frauds: usize) {
        self.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
        self.rows_persisted.fetch_add(rows as u64, Ordering::Relaxed);
        self.fraud_verdicts.fetch_add(frauds as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.cycle_times.write() {
            times.push(elapsed.as_millis() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record a failed cycle
    pub fn record_failure(&self, kind: &str) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Get cycle duration statistics
    pub fn get_cycle_stats(&self) -> CycleStats {
        let Ok(times) = self.cycle_times.read() else {
            return CycleStats::default();
        };
        if times.is_empty() {
            return CycleStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        CycleStats {
            count: count as u64,
            mean_ms: sum / count as u64,
            p50_ms: sorted[count / 2],
            p95_ms: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            max_ms: sorted[count - 1],
        }
    }

    /// Get failures by error kind
    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Share of started cycles that failed, in percent
    pub fn failure_rate(&self) -> f64 {
        let started = self.cycles_started.load(Ordering::Relaxed);
        if started == 0 {
            return 0.0;
        }
        self.cycles_failed.load(Ordering::Relaxed) as f64 / started as f64 * 100.0
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let started = self.cycles_started.load(Ordering::Relaxed);
        let succeeded = self.cycles_succeeded.load(Ordering::Relaxed);
        let failed = self.cycles_failed.load(Ordering::Relaxed);
        let rows = self.rows_persisted.load(Ordering::Relaxed);
        let frauds = self.fraud_verdicts.load(Ordering::Relaxed);
        let stats = self.get_cycle_stats();

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            cycles_started = started,
            cycles_succeeded = succeeded,
            cycles_failed = failed,
            failure_rate = format!("{:.1}%", self.failure_rate()),
            rows_persisted = rows,
            fraud_verdicts = frauds,
            "Pipeline summary"
        );
        info!(
            mean_ms = stats.mean_ms,
            p50_ms = stats.p50_ms,
            p95_ms = stats.p95_ms,
            max_ms = stats.max_ms,
            "Cycle duration"
        );
        for (kind, count) in &self.get_failures_by_kind() {
            info!(error_kind = %kind, count = count, "Cycle failures");
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycle duration statistics
#[derive(Debug, Default)]
pub struct CycleStats {
    pub count: u64,
    pub mean_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub max_ms: u64,
}
