use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs_requested: u64,
    pub runs_rejected: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub active_runs: u64,
    pub items_produced: u64,
    pub success_rate: f64,
    pub avg_run_time_ms: u64,
    pub elapsed_seconds: f64,
}
