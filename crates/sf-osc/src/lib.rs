//! SF-OSC — Verified OSC Transport
//!
//! UDP control link to a live audio host:
//! - Fire-and-forget command datagrams
//! - Request/reply queries over a dedicated reply port
//! - Verified write-then-read with exponential backoff
//! - Hand-packed loader datagrams for the device loader script
//!
//! ## Architecture
//!
//! ```text
//! caller ──send──────────────▶ command port (host)
//!    │
//!    ├──query──▶ wait on condvar ◀──┐
//!    │                              │ latest reply per address
//! listener thread ◀─reply port──────┘
//! ```
//!
//! The host replies asynchronously on a separate port; a background listener
//! thread dispatches each reply to whichever caller is blocked waiting on a
//! matching address. Everything is timeout-bounded; nothing waits forever.

mod client;
mod codec;
mod error;

pub use client::*;
pub use codec::*;
pub use error::*;

pub use rosc::OscType;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
