//! Error types for the control layer

use thiserror::Error;

/// Control-layer errors
///
/// Per-parameter and per-device failures inside aggregate operations are
/// reported through result structs, not raised — a failed knob must never
/// abort its siblings.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Transport error: {0}")]
    Osc(#[from] sf_osc::OscError),

    #[error("No reply from host for {0}")]
    NoReply(String),

    #[error("Recovery exhausted after {attempts} attempt(s) during {operation}")]
    RecoveryExhausted { operation: String, attempts: u32 },
}

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;
