//! Run metrics
//!
//! Bounded in-memory history of pipeline runs plus one structured log line
//! per run, so a shell `grep PIPELINE_` over the logs answers the usual
//! questions without a metrics backend.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::report::{Phase, RunReport};

/// Condensed record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub at: DateTime<Utc>,
    pub success: bool,
    pub phase_reached: Phase,
    pub track_index: usize,
    pub devices_planned: usize,
    pub devices_loaded: usize,
    pub params_planned: usize,
    pub params_set: usize,
    pub params_verified: usize,
    pub params_skipped_idempotent: usize,
    pub advisory_calls: u32,
    pub elapsed_ms: f64,
    pub dry_run: bool,
    pub error_count: usize,
}

/// Aggregate view across recorded runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub total_runs: usize,
    pub success_rate: f64,
    pub avg_elapsed_ms: f64,
    pub total_advisory_calls: u64,
    pub total_params_set: u64,
    pub total_params_skipped: u64,
}

/// Records and reports pipeline execution metrics.
pub struct PipelineMetrics {
    history: Mutex<VecDeque<RunSummary>>,
    max_history: usize,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineMetrics {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            max_history: max_history.max(1),
        }
    }

    pub fn record(&self, report: &RunReport) {
        let summary = RunSummary {
            at: Utc::now(),
            success: report.success,
            phase_reached: report.phase_reached,
            track_index: report.track_index,
            devices_planned: report.devices_planned,
            devices_loaded: report.devices_loaded,
            params_planned: report.params_planned,
            params_set: report.params_set,
            params_verified: report.params_verified,
            params_skipped_idempotent: report.params_skipped_idempotent,
            advisory_calls: report.advisory_calls_used,
            elapsed_ms: report.elapsed_ms,
            dry_run: report.dry_run,
            error_count: report.errors.len(),
        };

        let mut history = self.history.lock();
        history.push_back(summary);
        while history.len() > self.max_history {
            history.pop_front();
        }
        drop(history);

        if report.success {
            log::info!(
                "PIPELINE_OK track={} devices={}/{} params={}/{} verified={} skipped={} advisory={} time={:.0}ms",
                report.track_index,
                report.devices_loaded,
                report.devices_planned,
                report.params_set,
                report.params_planned,
                report.params_verified,
                report.params_skipped_idempotent,
                report.advisory_calls_used,
                report.elapsed_ms,
            );
        } else {
            log::warn!(
                "PIPELINE_FAIL track={} phase={:?} devices={}/{} errors={:?} time={:.0}ms",
                report.track_index,
                report.phase_reached,
                report.devices_loaded,
                report.devices_planned,
                &report.errors[..report.errors.len().min(3)],
                report.elapsed_ms,
            );
        }
    }

    pub fn stats(&self) -> MetricsSnapshot {
        let history = self.history.lock();
        if history.is_empty() {
            return MetricsSnapshot::default();
        }

        let total = history.len();
        let successes = history.iter().filter(|h| h.success).count();
        MetricsSnapshot {
            total_runs: total,
            success_rate: successes as f64 / total as f64,
            avg_elapsed_ms: history.iter().map(|h| h.elapsed_ms).sum::<f64>() / total as f64,
            total_advisory_calls: history.iter().map(|h| h.advisory_calls as u64).sum(),
            total_params_set: history.iter().map(|h| h.params_set as u64).sum(),
            total_params_skipped: history
                .iter()
                .map(|h| h.params_skipped_idempotent as u64)
                .sum(),
        }
    }

    pub fn history(&self) -> Vec<RunSummary> {
        self.history.lock().iter().cloned().collect()
    }
}
