//! Timer capability and timer primitives.
//!
//! This module provides the time-related building blocks of the
//! long-poll core.
//!
//! It includes:
//! - [`Scheduler`], the injected timer capability,
//! - [`DeadlineTimer`], a one-shot timer fixed at creation,
//! - [`GraceTimer`], a one-shot timer that restarts on every `reset`,
//! - [`ManualClock`], a virtual-time scheduler for deterministic tests.
//!
//! The production scheduler is [`ReactorHandle`](crate::ReactorHandle).

mod deadline;
mod grace;
mod manual;

#[cfg(test)]
pub(crate) mod held;

#[doc(inline)]
pub use deadline::DeadlineTimer;

#[doc(inline)]
pub use grace::GraceTimer;

#[doc(inline)]
pub use manual::ManualClock;

use crate::error::TimerError;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A callback run once by a [`Scheduler`] when its delay elapses.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// A timer-scheduling capability.
///
/// Implementations run each scheduled task at most once, on a dispatch
/// context of their choosing, unless the returned handle is cancelled
/// first. A task already in flight when `cancel` is called may still run.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run once after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError`] if the facility cannot accept the task.
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle, TimerError>;

    /// Real-time safety net for a blocking wait bounded by `max_wait`.
    ///
    /// Schedulers driven by the wall clock return `Some(max_wait)` so the
    /// deadline alarm's duration doubles as the ceiling of the wait.
    fn ceiling(&self, max_wait: Duration) -> Option<Duration> {
        Some(max_wait)
    }
}

/// Cancellation handle for a scheduled task.
///
/// Cancelling is idempotent and never blocks. Clones share the same timer.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl TimerHandle {
    pub(crate) fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            on_cancel: None,
        }
    }

    /// Registers a hook run by the first successful `cancel`.
    pub(crate) fn on_cancel(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_cancel = Some(Arc::new(hook));
        self
    }

    /// Prevents the task from running if it has not started yet.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(hook) = &self.on_cancel {
            hook();
        }
    }

    /// Returns `true` once the timer was cancelled or has fired.
    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("done", &self.is_done())
            .finish()
    }
}
