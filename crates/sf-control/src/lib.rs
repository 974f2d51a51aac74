//! SF-Control — Reliable Parameter Control
//!
//! Turns the raw transport into operations a chain builder can trust:
//! - Parameter discovery with a per-device cache and name resolution
//! - Semantic value curves (Hz, dB, ms, %, toggles, enums ↔ normalized)
//! - Device readiness polling after fire-and-forget instantiation
//! - Verified by-name parameter writes and batches
//! - Crash detection with bounded, cooldown-spaced recovery
//!
//! ## Architecture
//!
//! ```text
//! ParamController ──▶ LiveApi (trait) ──▶ LiveHost ──▶ sf-osc ──▶ host
//!       │                                    ▲
//!       ├── ParameterCache                   └── in-memory fakes (tests)
//!       ├── curve (Hz/dB/ms/% ↔ normalized)
//!       └── CrashRecoveryManager (probe + callbacks + snapshot hook)
//! ```

mod api;
mod cache;
mod controller;
pub mod curve;
mod error;
mod recovery;

pub use api::*;
pub use cache::*;
pub use controller::*;
pub use curve::Curve;
pub use error::*;
pub use recovery::*;

pub use sf_osc::{ClientConfig, OscClient, OscType, RetryPolicy, SetOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
