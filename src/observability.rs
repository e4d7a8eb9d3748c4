// =============================================================================
// Observability (C13) — metrics counters/histograms + degraded-mode tracker
// =============================================================================
//
// No metrics crate is in the dependency stack (the teacher tracks counters
// with plain `AtomicU64`s in `app_state.rs` and reports them through a
// snapshot struct rather than a Prometheus exporter), so this module follows
// the same shape: atomics for counters, a capped ring buffer of recent
// latency samples for the "histograms", and a small per-dependency tracker
// modelled on the teacher's risk-mode labeling in `risk.rs` — a state that
// flips to DEGRADED after a run of consecutive failures and is reported
// through `GET /health`.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Number of most-recent latency samples retained per histogram.
const MAX_SAMPLES: usize = 500;

/// Consecutive failures before a dependency is reported DEGRADED.
const DEGRADE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DependencyHealth {
    Healthy,
    Degraded,
}

struct DependencyState {
    consecutive_failures: u32,
    health: DependencyHealth,
}

impl Default for DependencyState {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            health: DependencyHealth::Healthy,
        }
    }
}

/// Tracks per-dependency success/failure streaks and reports a DEGRADED
/// state once a dependency has failed `DEGRADE_THRESHOLD` times in a row.
/// A single success resets the streak immediately.
#[derive(Default)]
pub struct DegradedModeTracker {
    inner: RwLock<HashMap<String, DependencyState>>,
}

impl DegradedModeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, dependency: &str) {
        let mut inner = self.inner.write();
        let state = inner.entry(dependency.to_string()).or_default();
        state.consecutive_failures = 0;
        state.health = DependencyHealth::Healthy;
    }

    pub fn record_failure(&self, dependency: &str) {
        let mut inner = self.inner.write();
        let state = inner.entry(dependency.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= DEGRADE_THRESHOLD {
            state.health = DependencyHealth::Degraded;
        }
    }

    pub fn health_of(&self, dependency: &str) -> DependencyHealth {
        self.inner
            .read()
            .get(dependency)
            .map(|s| s.health)
            .unwrap_or(DependencyHealth::Healthy)
    }

    /// Snapshot of every dependency seen so far, for `GET /health`.
    pub fn snapshot(&self) -> HashMap<String, DependencyHealth> {
        self.inner
            .read()
            .iter()
            .map(|(name, state)| (name.clone(), state.health))
            .collect()
    }

    pub fn is_any_degraded(&self) -> bool {
        self.inner
            .read()
            .values()
            .any(|s| s.health == DependencyHealth::Degraded)
    }
}

/// A capped ring buffer of latency samples (milliseconds) plus the simple
/// derived stats a dashboard would want, standing in for a histogram without
/// pulling in a metrics crate.
#[derive(Default)]
struct Histogram {
    samples: Vec<u64>,
}

impl Histogram {
    fn record(&mut self, value_ms: u64) {
        self.samples.push(value_ms);
        if self.samples.len() > MAX_SAMPLES {
            let overflow = self.samples.len() - MAX_SAMPLES;
            self.samples.drain(0..overflow);
        }
    }

    fn snapshot(&self) -> HistogramSnapshot {
        if self.samples.is_empty() {
            return HistogramSnapshot::default();
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let p50 = sorted[count / 2];
        let p99 = sorted[(count * 99 / 100).min(count - 1)];
        HistogramSnapshot {
            count,
            mean_ms: sum as f64 / count as f64,
            p50_ms: p50,
            p99_ms: p99,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistogramSnapshot {
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub signals_accepted: u64,
    pub signals_rejected: u64,
    pub entries_entered: u64,
    pub entries_rejected: u64,
    pub exits_exited: u64,
    pub exits_held: u64,
    pub pipeline_failures: u64,
    pub ingestion_latency: HistogramSnapshot,
    pub decision_latency: HistogramSnapshot,
}

/// Counters for accepted/rejected signals and decisions, plus latency
/// histograms for ingestion and decision stages.
pub struct Metrics {
    signals_accepted: AtomicU64,
    signals_rejected: AtomicU64,
    entries_entered: AtomicU64,
    entries_rejected: AtomicU64,
    exits_exited: AtomicU64,
    exits_held: AtomicU64,
    pipeline_failures: AtomicU64,
    ingestion_latency: RwLock<Histogram>,
    decision_latency: RwLock<Histogram>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            signals_accepted: AtomicU64::new(0),
            signals_rejected: AtomicU64::new(0),
            entries_entered: AtomicU64::new(0),
            entries_rejected: AtomicU64::new(0),
            exits_exited: AtomicU64::new(0),
            exits_held: AtomicU64::new(0),
            pipeline_failures: AtomicU64::new(0),
            ingestion_latency: RwLock::new(Histogram::default()),
            decision_latency: RwLock::new(Histogram::default()),
        }
    }

    pub fn record_signal_accepted(&self) {
        self.signals_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal_rejected(&self) {
        self.signals_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entry_outcome(&self, entered: bool) {
        if entered {
            self.entries_entered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.entries_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_exit_outcome(&self, exited: bool) {
        if exited {
            self.exits_exited.fetch_add(1, Ordering::Relaxed);
        } else {
            self.exits_held.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_pipeline_failure(&self) {
        self.pipeline_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingestion_latency(&self, ms: u64) {
        self.ingestion_latency.write().record(ms);
    }

    pub fn record_decision_latency(&self, ms: u64) {
        self.decision_latency.write().record(ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            signals_accepted: self.signals_accepted.load(Ordering::Relaxed),
            signals_rejected: self.signals_rejected.load(Ordering::Relaxed),
            entries_entered: self.entries_entered.load(Ordering::Relaxed),
            entries_rejected: self.entries_rejected.load(Ordering::Relaxed),
            exits_exited: self.exits_exited.load(Ordering::Relaxed),
            exits_held: self.exits_held.load(Ordering::Relaxed),
            pipeline_failures: self.pipeline_failures.load(Ordering::Relaxed),
            ingestion_latency: self.ingestion_latency.read().snapshot(),
            decision_latency: self.decision_latency.read().snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrades_after_threshold_consecutive_failures() {
        let tracker = DegradedModeTracker::new();
        assert_eq!(tracker.health_of("gex"), DependencyHealth::Healthy);
        tracker.record_failure("gex");
        tracker.record_failure("gex");
        assert_eq!(tracker.health_of("gex"), DependencyHealth::Healthy);
        tracker.record_failure("gex");
        assert_eq!(tracker.health_of("gex"), DependencyHealth::Degraded);
    }

    #[test]
    fn success_resets_the_streak() {
        let tracker = DegradedModeTracker::new();
        tracker.record_failure("adapter");
        tracker.record_failure("adapter");
        tracker.record_success("adapter");
        tracker.record_failure("adapter");
        assert_eq!(tracker.health_of("adapter"), DependencyHealth::Healthy);
    }

    #[test]
    fn metrics_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_signal_accepted();
        metrics.record_signal_accepted();
        metrics.record_signal_rejected();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.signals_accepted, 2);
        assert_eq!(snapshot.signals_rejected, 1);
    }

    #[test]
    fn histogram_reports_percentiles() {
        let metrics = Metrics::new();
        for ms in 1..=100 {
            metrics.record_ingestion_latency(ms);
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingestion_latency.count, 100);
        assert_eq!(snapshot.ingestion_latency.p50_ms, 51);
    }
}
