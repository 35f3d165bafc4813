use super::{Scheduler, TimerHandle};
use crate::error::TimerError;

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A restartable one-shot timer.
///
/// A `GraceTimer` starts idle. Each [`reset`](Self::reset) discards the
/// pending firing, if any, and schedules a fresh one. The callback runs at
/// most once over the timer's whole life; after it ran, or after
/// [`cancel`](Self::cancel), `reset` is a no-op.
///
/// A firing that was superseded by a later `reset` but was already in
/// flight on the dispatch thread is recognised by its generation number
/// and dropped.
#[derive(Clone)]
pub struct GraceTimer {
    inner: Arc<Inner>,
}

struct Inner {
    scheduler: Arc<dyn Scheduler>,
    on_fire: Box<dyn Fn() + Send + Sync>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    generation: u64,
    pending: Option<TimerHandle>,
    fired: bool,
    cancelled: bool,
}

impl GraceTimer {
    /// Creates an idle grace timer that runs `on_fire` when it elapses.
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, on_fire: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                on_fire: Box::new(on_fire),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Restarts the grace window so that it elapses `delay` from now.
    ///
    /// A zero `delay` fires immediately on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError`] if the scheduler refuses the new firing.
    /// The previous firing is cancelled either way.
    pub fn reset(&self, delay: Duration) -> Result<(), TimerError> {
        {
            let mut state = self.inner.state.lock();

            if state.fired || state.cancelled {
                return Ok(());
            }

            if let Some(pending) = state.pending.take() {
                pending.cancel();
            }

            state.generation += 1;

            if !delay.is_zero() {
                let generation = state.generation;
                let weak: Weak<Inner> = Arc::downgrade(&self.inner);

                let handle = self.inner.scheduler.schedule(
                    delay,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.fire(generation);
                        }
                    }),
                )?;

                state.pending = Some(handle);
                return Ok(());
            }

            state.fired = true;
        }

        (self.inner.on_fire)();
        Ok(())
    }

    /// Cancels any pending firing. Idempotent.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        state.cancelled = true;

        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
    }

    /// Returns `true` once the callback has run.
    pub fn has_fired(&self) -> bool {
        self.inner.state.lock().fired
    }

    /// Returns `true` while a firing is scheduled.
    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }
}

impl Inner {
    fn fire(&self, generation: u64) {
        {
            let mut state = self.state.lock();

            if state.cancelled || state.fired || state.generation != generation {
                return;
            }

            state.fired = true;
            state.pending = None;
        }

        (self.on_fire)();
    }
}
