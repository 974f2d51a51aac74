//! SF-Pipeline — Deterministic Chain Orchestration
//!
//! Loads and configures a sequence of processing devices on a live target,
//! exactly once per user request:
//! - Declarative plan in, itemized report out
//! - Four linear phases: PLAN → EXECUTE → VERIFY → REPORT
//! - Ordered device-name fallback against an incompletely known catalog
//! - Idempotent replay: parameters already at target are never rewritten
//! - Advisory-call guardrail fencing planning work from mutating work
//!
//! ## Architecture
//!
//! ```text
//! ChainPlan ──▶ PipelineExecutor ──▶ ParamController ──▶ host
//!                  │  PLAN     resolve names (fallback table)
//!                  │  EXECUTE  load + write params   [guardrail blocks]
//!                  │  VERIFY   re-read unconfirmed   [guardrail blocks]
//!                  │  REPORT   aggregate ──▶ RunReport
//!                  └── PipelineMetrics (history + PIPELINE_* log lines)
//! ```

mod error;
mod executor;
mod fallback;
mod guardrail;
mod metrics;
mod plan;
mod report;

pub use error::*;
pub use executor::*;
pub use fallback::*;
pub use guardrail::*;
pub use metrics::*;
pub use plan::*;
pub use report::*;

use std::sync::Arc;

use sf_control::{
    ClientConfig, ControlError, ControllerConfig, LiveHost, OscClient, ParamController,
};

/// Composition root: bind the OSC link and wire the full stack.
///
/// Shared state (cache, guardrail counters, recovery state) lives in owned,
/// internally synchronized objects constructed here and passed by handle —
/// a recovery manager for the same connection hangs off
/// `executor.controller().api_handle()`.
///
/// ```rust,ignore
/// use sf_control::{CrashRecoveryManager, RecoveryConfig};
///
/// let executor = sf_pipeline::connect(
///     ClientConfig::default(),
///     ControllerConfig::default(),
///     ExecutorConfig::default(),
/// )?;
/// let recovery = CrashRecoveryManager::new(
///     executor.controller().api_handle(),
///     RecoveryConfig::default(),
/// );
/// let names = recovery.execute_with_recovery("device_names", || {
///     executor.controller().api().device_names(0)
/// })?;
/// let report = executor.execute(&plan)?;
/// ```
pub fn connect(
    client: ClientConfig,
    controller: ControllerConfig,
    executor: ExecutorConfig,
) -> PipelineResult<PipelineExecutor<LiveHost>> {
    let client = OscClient::new(client).map_err(ControlError::from)?;
    let host = Arc::new(LiveHost::new(client));
    let controller = ParamController::new(host, controller);
    Ok(PipelineExecutor::new(controller).with_config(executor))
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
