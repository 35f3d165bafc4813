use super::{Scheduler, TimerHandle, TimerTask};
use crate::error::TimerError;
use crate::reactor::TimerEntry;

use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

/// A virtual-time [`Scheduler`].
///
/// Nothing fires until the clock is moved with [`advance`](Self::advance),
/// which runs every due callback on the calling thread, in deadline order.
/// Callbacks may schedule further timers; those fire within the same
/// `advance` if they fall due before its target.
///
/// `ManualClock` has no wall-clock ceiling: a waiter blocked under virtual
/// time stays blocked until a callback or an external wake resumes it.
///
/// # Examples
///
/// ```rust,ignore
/// let clock = Arc::new(ManualClock::new());
/// let coordinator = PollCoordinator::new(config, clock.clone());
/// let poll = coordinator.begin(None);
/// clock.advance(Duration::from_millis(500));
/// ```
pub struct ManualClock {
    origin: Instant,
    state: Mutex<State>,
}

struct State {
    now: Duration,
    seq: u64,
    timers: BinaryHeap<TimerEntry>,
    failing: bool,
}

impl ManualClock {
    /// Creates a clock at virtual time zero with no pending timers.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(State {
                now: Duration::ZERO,
                seq: 0,
                timers: BinaryHeap::new(),
                failing: false,
            }),
        }
    }

    /// Current virtual time, measured from the clock's creation.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Moves virtual time forward by `by`, firing every timer that falls due.
    ///
    /// A step past the furthest representable instant fires every pending
    /// timer and leaves the clock at the last deadline reached.
    pub fn advance(&self, by: Duration) {
        let target = self.origin.checked_add(self.now().saturating_add(by));

        loop {
            let due = {
                let mut state = self.state.lock();

                let ready = state
                    .timers
                    .peek()
                    .is_some_and(|t| target.is_none_or(|target| t.deadline <= target));
                if !ready {
                    if let Some(target) = target {
                        state.now = target - self.origin;
                    }
                    return;
                }

                let Some(entry) = state.timers.pop() else {
                    return;
                };

                let at = entry.deadline - self.origin;
                if at > state.now {
                    state.now = at;
                }

                entry
            };

            due.fire();
        }
    }

    /// Moves virtual time forward to `at`.
    ///
    /// If `at` is not in the future, only timers already due fire.
    pub fn advance_to(&self, at: Duration) {
        self.advance(at.saturating_sub(self.now()));
    }

    /// Number of timers scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .timers
            .iter()
            .filter(|t| !t.is_done())
            .count()
    }

    /// Makes every subsequent `schedule` call fail while `failing` is set.
    pub fn fail_scheduling(&self, failing: bool) {
        self.state.lock().failing = failing;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualClock {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle, TimerError> {
        let mut state = self.state.lock();

        if state.failing {
            return Err(TimerError::Exhausted("manual clock set to fail".into()));
        }

        let deadline = state
            .now
            .checked_add(delay)
            .and_then(|at| self.origin.checked_add(at))
            .ok_or(TimerError::OutOfRange(delay))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let seq = state.seq;
        state.seq += 1;

        state.timers.push(TimerEntry {
            deadline,
            seq,
            cancelled: cancelled.clone(),
            task,
        });

        Ok(TimerHandle::new(cancelled))
    }

    fn ceiling(&self, _max_wait: Duration) -> Option<Duration> {
        None
    }
}
