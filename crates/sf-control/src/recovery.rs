//! Crash detection and bounded recovery
//!
//! The host process can crash, hang, or drop its remote script; from this
//! side all of that looks like a particular family of transport errors.
//! Failures matching a known signature feed a lock-guarded consecutive
//! failure counter; past a threshold the connection is considered degraded
//! and a cooldown-spaced recovery loop takes over: snapshot, wait, probe
//! with a cheap no-op read, then notify listeners and restore.
//!
//! Recovery state is process-wide per manager because crash/recovery is a
//! property of the connection as a whole, not of any single caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::api::LiveApi;
use crate::error::{ControlError, ControlResult};

/// Error-text fragments that indicate the host or its remote script died,
/// rather than an ordinary per-operation failure.
pub const CRASH_SIGNATURES: &[&str] = &[
    "connection reset",
    "connection refused",
    "forcibly closed",
    "broken pipe",
    "socket closed",
    "no reply",
    "no response",
    "timed out",
    "remote script",
    "c++ exception",
    "failed to schedule",
    "os error 10054",
    "os error 10061",
];

/// Does this error text look like a host crash?
pub fn is_crash_indicator(text: &str) -> bool {
    let lower = text.to_lowercase();
    CRASH_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Connection health as tracked by the recovery manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Enough consecutive failures to suspect a crash
    Degraded,
    /// A recovery attempt is in flight
    Recovering,
    /// Recovery budget spent; manual intervention needed
    Exhausted,
}

/// Recovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Recovery attempts before giving up
    pub max_recovery_attempts: u32,
    /// Spacing between attempts, also the settle wait inside one
    pub cooldown_ms: u64,
    /// Consecutive failures before the connection counts as degraded
    pub degraded_threshold: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 3,
            cooldown_ms: 5000,
            degraded_threshold: 3,
        }
    }
}

/// Point-in-time view of the recovery state.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatus {
    pub health: HealthState,
    pub crash_count: u32,
    pub recovery_attempts: u32,
    pub consecutive_failures: u32,
    pub last_crash: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
}

/// Optional session snapshot/restore around a recovery cycle.
pub trait SnapshotHook: Send + Sync {
    /// Called before the cooldown wait, while state may still be readable.
    fn snapshot(&self);
    /// Called after a successful probe. Returns whether restore succeeded.
    fn restore(&self) -> bool;
}

struct RecoveryState {
    health: HealthState,
    crash_count: u32,
    recovery_attempts: u32,
    consecutive_failures: u32,
    last_crash: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_attempt: Option<Instant>,
}

/// Crash detection and bounded reconnect for one host connection.
pub struct CrashRecoveryManager<A: LiveApi> {
    api: Arc<A>,
    config: RecoveryConfig,
    state: Mutex<RecoveryState>,
    callbacks: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
    snapshot: Mutex<Option<Arc<dyn SnapshotHook>>>,
}

impl<A: LiveApi> CrashRecoveryManager<A> {
    pub fn new(api: Arc<A>, config: RecoveryConfig) -> Self {
        Self {
            api,
            config,
            state: Mutex::new(RecoveryState {
                health: HealthState::Healthy,
                crash_count: 0,
                recovery_attempts: 0,
                consecutive_failures: 0,
                last_crash: None,
                last_success: None,
                last_attempt: None,
            }),
            callbacks: Mutex::new(Vec::new()),
            snapshot: Mutex::new(None),
        }
    }

    /// Register a listener invoked after each successful recovery, in
    /// registration order. A panicking listener does not block the rest.
    pub fn register_recovery_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().push(Box::new(callback));
    }

    pub fn set_snapshot_hook(&self, hook: Arc<dyn SnapshotHook>) {
        *self.snapshot.lock() = Some(hook);
    }

    pub fn health(&self) -> HealthState {
        self.state.lock().health
    }

    pub fn status(&self) -> RecoveryStatus {
        let state = self.state.lock();
        RecoveryStatus {
            health: state.health,
            crash_count: state.crash_count,
            recovery_attempts: state.recovery_attempts,
            consecutive_failures: state.consecutive_failures,
            last_crash: state.last_crash,
            last_success: state.last_success,
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures == self.config.degraded_threshold {
            state.crash_count += 1;
            state.last_crash = Some(Utc::now());
            state.health = HealthState::Degraded;
            log::warn!(
                "[Recovery] {} consecutive failures, connection degraded (crash #{})",
                state.consecutive_failures,
                state.crash_count
            );
        }
    }

    /// Record a successful operation, clearing the failure streak.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.last_success = Some(Utc::now());
        if state.health != HealthState::Exhausted {
            state.health = HealthState::Healthy;
        }
    }

    /// Run one recovery cycle: snapshot, wait out the cooldown, probe, then
    /// notify listeners and restore. Rate-limited by the cooldown and
    /// bounded by `max_recovery_attempts`.
    pub fn attempt_recovery(&self) -> bool {
        let attempt = {
            let mut state = self.state.lock();
            if state.recovery_attempts >= self.config.max_recovery_attempts {
                state.health = HealthState::Exhausted;
                log::error!(
                    "[Recovery] attempt budget ({}) spent",
                    self.config.max_recovery_attempts
                );
                return false;
            }
            if let Some(last) = state.last_attempt {
                if last.elapsed() < Duration::from_millis(self.config.cooldown_ms) {
                    log::debug!("[Recovery] attempt suppressed, cooldown active");
                    return false;
                }
            }
            state.recovery_attempts += 1;
            state.last_attempt = Some(Instant::now());
            state.health = HealthState::Recovering;
            state.recovery_attempts
        };

        log::info!(
            "[Recovery] attempt {}/{}",
            attempt,
            self.config.max_recovery_attempts
        );

        let hook = self.snapshot.lock().clone();
        if let Some(hook) = &hook {
            hook.snapshot();
        }

        thread::sleep(Duration::from_millis(self.config.cooldown_ms));

        match self.api.probe() {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    state.recovery_attempts = 0;
                    state.consecutive_failures = 0;
                    state.health = HealthState::Healthy;
                }
                log::info!("[Recovery] host responding again");

                for callback in self.callbacks.lock().iter() {
                    if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                        log::error!("[Recovery] recovery callback panicked");
                    }
                }

                if let Some(hook) = &hook {
                    if !hook.restore() {
                        log::warn!("[Recovery] snapshot restore failed");
                    }
                }
                true
            }
            Err(e) => {
                log::warn!("[Recovery] probe failed: {}", e);
                false
            }
        }
    }

    /// Run an operation, retrying through one recovery cycle per detected
    /// crash. Non-crash errors pass straight through; a failed or exhausted
    /// recovery surfaces as [`ControlError::RecoveryExhausted`].
    pub fn execute_with_recovery<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> ControlResult<T>,
    ) -> ControlResult<T> {
        for _ in 0..=self.config.max_recovery_attempts {
            match op() {
                Ok(value) => {
                    self.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    if !is_crash_indicator(&e.to_string()) {
                        return Err(e);
                    }
                    log::warn!("[Recovery] {} hit crash indicator: {}", operation, e);
                    self.record_failure();
                    // A failed attempt still leaves budget for the next
                    // crash; only exhaustion stops the loop early.
                    if !self.attempt_recovery() && self.health() == HealthState::Exhausted {
                        break;
                    }
                }
            }
        }

        let attempts = self.state.lock().recovery_attempts;
        Err(ControlError::RecoveryExhausted {
            operation: operation.to_string(),
            attempts,
        })
    }
}
