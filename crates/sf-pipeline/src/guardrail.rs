//! Advisory-call guardrail
//!
//! One user request is allowed exactly one expensive advisory (planner)
//! call — two on an explicit retry. EXECUTE and VERIFY are deterministic
//! replay phases and must never trigger one, however deep the call stack:
//! the blocked-phase flag is thread-local, so even advisory calls reached
//! through several layers of indirection on the executing thread fail
//! closed, while unrelated threads keep working.

use std::cell::RefCell;

use parking_lot::Mutex;

use crate::error::PipelineError;

/// Default advisory budget per user request.
pub const MAX_CALLS_DEFAULT: u32 = 1;
/// Budget when the user explicitly retries.
pub const MAX_CALLS_RETRY: u32 = 2;

thread_local! {
    static BLOCKED_PHASE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// The phase blocked on the current thread, if any.
pub fn blocked_phase() -> Option<String> {
    BLOCKED_PHASE.with(|p| p.borrow().clone())
}

/// Process-wide guard for advisory callers: raises when the current thread
/// is inside a blocked phase. Reachable from arbitrarily indirect calls
/// without threading the guardrail handle through every signature.
pub fn assert_advisory_allowed() -> Result<(), PipelineError> {
    match blocked_phase() {
        Some(phase) => Err(PipelineError::CallBlocked { phase }),
        None => Ok(()),
    }
}

/// Scoped phase block; restores the previous phase on drop.
pub struct PhaseGuard {
    prev: Option<String>,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        BLOCKED_PHASE.with(|p| *p.borrow_mut() = prev);
    }
}

struct Counter {
    calls: u32,
    max: u32,
}

/// Thread-safe advisory call counter and phase blocker.
pub struct CallGuardrail {
    inner: Mutex<Counter>,
}

impl Default for CallGuardrail {
    fn default() -> Self {
        Self::new(MAX_CALLS_DEFAULT)
    }
}

impl CallGuardrail {
    pub fn new(max_calls: u32) -> Self {
        Self {
            inner: Mutex::new(Counter {
                calls: 0,
                max: max_calls,
            }),
        }
    }

    /// Record an advisory call. Raises once the budget is spent.
    pub fn record_call(&self, tag: &str) -> Result<u32, PipelineError> {
        let mut counter = self.inner.lock();
        if counter.calls >= counter.max {
            return Err(PipelineError::BudgetExceeded {
                attempted: counter.calls + 1,
                max: counter.max,
            });
        }
        counter.calls += 1;
        log::debug!(
            "[Guardrail] advisory call #{}/{} recorded ({})",
            counter.calls,
            counter.max,
            tag
        );
        Ok(counter.calls)
    }

    /// Raise if an advisory call must not happen right now: blocked phase on
    /// this thread, or budget already spent.
    pub fn assert_allowed(&self) -> Result<(), PipelineError> {
        assert_advisory_allowed()?;
        let counter = self.inner.lock();
        if counter.calls >= counter.max {
            return Err(PipelineError::BudgetExceeded {
                attempted: counter.calls + 1,
                max: counter.max,
            });
        }
        Ok(())
    }

    /// Enter a blocked phase on the current thread for the guard's lifetime.
    pub fn block_phase(&self, phase: &str) -> PhaseGuard {
        let prev = BLOCKED_PHASE.with(|p| p.borrow_mut().replace(phase.to_string()));
        PhaseGuard { prev }
    }

    pub fn calls_used(&self) -> u32 {
        self.inner.lock().calls
    }

    pub fn calls_remaining(&self) -> u32 {
        let counter = self.inner.lock();
        counter.max.saturating_sub(counter.calls)
    }

    /// Reset between independent user requests; optionally adjust the budget
    /// (e.g. [`MAX_CALLS_RETRY`] on an explicit retry).
    pub fn reset(&self, max_calls: Option<u32>) {
        let mut counter = self.inner.lock();
        counter.calls = 0;
        if let Some(max) = max_calls {
            counter.max = max;
        }
        drop(counter);
        BLOCKED_PHASE.with(|p| *p.borrow_mut() = None);
    }
}
