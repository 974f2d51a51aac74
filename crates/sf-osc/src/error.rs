//! Error types for the OSC transport layer

use thiserror::Error;

/// Transport-level errors
///
/// Verification misses are not errors: a set whose readback never matched is
/// reported through [`crate::SetOutcome`] with `verified = false`. Only
/// failures of the link itself surface here.
#[derive(Error, Debug)]
pub enum OscError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid socket address: {0}")]
    Address(String),

    #[error("Failed to encode OSC message: {0}")]
    Encode(String),

    #[error("Failed to decode OSC packet: {0}")]
    Decode(String),

    #[error("Loader rejected request: {0}")]
    Loader(String),

    #[error("No reply from loader within {0} ms")]
    LoaderTimeout(u64),
}

/// Result type for transport operations
pub type OscResult<T> = Result<T, OscError>;
