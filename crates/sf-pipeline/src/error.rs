//! Error types for the pipeline layer

use thiserror::Error;

/// Pipeline errors
///
/// Per-device and per-parameter failures are aggregated into the run report,
/// not raised. The exceptions are guardrail violations and plans that are
/// malformed outright — both indicate an orchestration bug upstream.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Advisory call #{attempted} exceeds the budget of {max} for this request")]
    BudgetExceeded { attempted: u32, max: u32 },

    #[error("Advisory calls are blocked during the '{phase}' phase")]
    CallBlocked { phase: String },

    #[error(transparent)]
    Control(#[from] sf_control::ControlError),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
