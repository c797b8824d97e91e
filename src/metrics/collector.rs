use crate::metrics::snapshot::MetricsSnapshot;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct MetricsCollector {
    runs_requested: Arc<AtomicU64>,
    runs_rejected: Arc<AtomicU64>,
    runs_succeeded: Arc<AtomicU64>,
    runs_failed: Arc<AtomicU64>,
    active_runs: Arc<AtomicU64>,
    items_produced: Arc<AtomicU64>,
    total_run_time_ms: Arc<AtomicU64>,
    start_time: Arc<Instant>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            runs_requested: Arc::new(AtomicU64::new(0)),
            runs_rejected: Arc::new(AtomicU64::new(0)),
            runs_succeeded: Arc::new(AtomicU64::new(0)),
            runs_failed: Arc::new(AtomicU64::new(0)),
            active_runs: Arc::new(AtomicU64::new(0)),
            items_produced: Arc::new(AtomicU64::new(0)),
            total_run_time_ms: Arc::new(AtomicU64::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_runs_requested(&self) {
        self.runs_requested.fetch_add(1, Ordering::SeqCst);
    }

    /// A trigger refused before reaching the collaborator.
    pub fn increment_runs_rejected(&self) {
        self.runs_rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_active_runs(&self) {
        self.active_runs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_active_runs(&self) {
        self.active_runs.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_success(&self, duration: Duration, items: u64) {
        self.runs_succeeded.fetch_add(1, Ordering::SeqCst);
        self.items_produced.fetch_add(items, Ordering::SeqCst);
        self.total_run_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn record_failure(&self, duration: Duration) {
        self.runs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_run_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let succeeded = self.runs_succeeded.load(Ordering::SeqCst);
        let failed = self.runs_failed.load(Ordering::SeqCst);
        let finished = succeeded + failed;
        let total_time = self.total_run_time_ms.load(Ordering::SeqCst);

        let success_rate = if finished > 0 {
            (succeeded as f64 / finished as f64) * 100.0
        } else {
            0.0
        };

        let avg_run_time_ms = if finished > 0 { total_time / finished } else { 0 };

        MetricsSnapshot {
            runs_requested: self.runs_requested.load(Ordering::SeqCst),
            runs_rejected: self.runs_rejected.load(Ordering::SeqCst),
            runs_succeeded: succeeded,
            runs_failed: failed,
            active_runs: self.active_runs.load(Ordering::SeqCst),
            items_produced: self.items_produced.load(Ordering::SeqCst),
            success_rate,
            avg_run_time_ms,
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_derives_rates_from_finished_runs() {
        let metrics = MetricsCollector::new();
        metrics.increment_runs_requested();
        metrics.increment_runs_requested();
        metrics.increment_runs_requested();
        metrics.increment_runs_rejected();
        metrics.record_success(Duration::from_millis(300), 12);
        metrics.record_failure(Duration::from_millis(100));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_requested, 3);
        assert_eq!(snapshot.runs_rejected, 1);
        assert_eq!(snapshot.items_produced, 12);
        assert_eq!(snapshot.avg_run_time_ms, 200);
        assert!((snapshot.success_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = MetricsCollector::new();
        let clone = metrics.clone();
        clone.increment_active_runs();
        assert_eq!(metrics.snapshot().active_runs, 1);
        metrics.decrement_active_runs();
        assert_eq!(clone.snapshot().active_runs, 0);
    }
}
