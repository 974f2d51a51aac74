//! Run reports
//!
//! The result side of the plan-in/result-out contract. Reports are built
//! incrementally during a run and immutable once returned; per-item failures
//! live in the items, aggregate policy in the top-level flags.

use serde::{Deserialize, Serialize};

/// Execution phase of the pipeline. Linear, each entered once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Execute,
    Verify,
    Report,
}

/// Result of setting a single parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamOutcome {
    pub name: String,
    pub requested: f32,
    /// Last known value in human units; always present when verified
    #[serde(default)]
    pub actual: Option<f32>,
    pub success: bool,
    #[serde(default)]
    pub verified: bool,
    /// The host already matched the target; no write was issued
    #[serde(default)]
    pub skipped_idempotent: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of loading and configuring a single device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceOutcome {
    /// Name actually loaded (differs from `requested_name` on fallback)
    pub name: String,
    pub requested_name: String,
    #[serde(default)]
    pub device_index: Option<usize>,
    pub loaded: bool,
    #[serde(default)]
    pub is_fallback: bool,
    #[serde(default)]
    pub params: Vec<ParamOutcome>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub load_time_ms: f64,
    #[serde(default)]
    pub param_time_ms: f64,
}

/// Complete result of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Policy-driven: every planned device loaded and no unrecovered errors.
    /// Parameter misses on a fully-built chain are demoted to warnings.
    pub success: bool,
    pub phase_reached: Phase,
    pub track_index: usize,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub devices: Vec<DeviceOutcome>,
    pub devices_planned: usize,
    pub devices_loaded: usize,
    pub params_planned: usize,
    pub params_set: usize,
    pub params_verified: usize,
    pub params_skipped_idempotent: usize,
    pub advisory_calls_used: u32,
    pub elapsed_ms: f64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RunReport {
    pub(crate) fn for_plan(plan: &crate::plan::ChainPlan) -> Self {
        Self {
            success: false,
            phase_reached: Phase::Plan,
            track_index: plan.track_index,
            description: plan.description.clone(),
            devices: Vec::new(),
            devices_planned: plan.devices.len(),
            devices_loaded: 0,
            params_planned: plan.devices.iter().map(|d| d.params.len()).sum(),
            params_set: 0,
            params_verified: 0,
            params_skipped_idempotent: 0,
            advisory_calls_used: 0,
            elapsed_ms: 0.0,
            dry_run: plan.dry_run,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}
