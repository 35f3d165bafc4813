use super::{Scheduler, TimerHandle};
use crate::error::TimerError;

use std::time::Duration;

/// A one-shot timer that fires once, a fixed delay after it was armed.
///
/// Unlike [`GraceTimer`](super::GraceTimer), a deadline cannot be pushed
/// back: once armed, it either fires at its deadline or is cancelled.
#[derive(Debug)]
pub struct DeadlineTimer {
    handle: TimerHandle,
}

impl DeadlineTimer {
    /// Schedules `on_fire` to run once after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError`] if the scheduler refuses the task.
    pub fn arm<F>(scheduler: &dyn Scheduler, delay: Duration, on_fire: F) -> Result<Self, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = scheduler.schedule(delay, Box::new(on_fire))?;

        Ok(Self { handle })
    }

    /// Cancels the timer. Safe to call after it fired, and more than once.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Returns `true` once the timer fired or was cancelled.
    pub fn is_done(&self) -> bool {
        self.handle.is_done()
    }
}
