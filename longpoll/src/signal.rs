//! Wake signals: the two triggers that can resume a blocked poll.

use crate::error::SignalError;
use crate::queue::{OutputQueue, Rank, Script, ScriptConduit};
use crate::time::{DeadlineTimer, GraceTimer, Scheduler};
use crate::waiter::{WakeHandle, WakeReason, Waiter};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Which trigger a [`WakeSignal`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Fires once the poll's maximum wait elapses.
    Deadline,

    /// Fires once output has arrived and the grace window after the last
    /// script passed without more.
    ActivityGrace,
}

/// A trigger that resumes at most one [`Waiter`].
///
/// A signal is armed for a waiter, then either fires once or is cancelled.
/// Cancelling is idempotent and safe after firing; it releases every timer
/// and queue subscription the signal holds. A signal must be cancelled
/// before it can be armed again.
pub enum WakeSignal {
    /// Resumes the waiter once the maximum wait has elapsed.
    Deadline(DeadlineAlarm),

    /// Resumes the waiter once output went quiet for the grace window.
    ActivityGrace(ActivityAlarm),
}

impl WakeSignal {
    /// A signal that fires `max_wait` after it is armed.
    pub fn deadline(max_wait: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        WakeSignal::Deadline(DeadlineAlarm {
            max_wait,
            scheduler,
            armed: None,
        })
    }

    /// A signal that fires `grace` after the last script enqueued on
    /// `queue` while it is armed.
    pub fn activity_grace(
        queue: Arc<dyn OutputQueue>,
        grace: Duration,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        WakeSignal::ActivityGrace(ActivityAlarm {
            queue,
            grace,
            scheduler,
            armed: None,
        })
    }

    /// Which trigger this signal is.
    pub fn kind(&self) -> SignalKind {
        match self {
            WakeSignal::Deadline(_) => SignalKind::Deadline,
            WakeSignal::ActivityGrace(_) => SignalKind::ActivityGrace,
        }
    }

    /// Points the signal at `waiter` and starts watching.
    ///
    /// # Errors
    ///
    /// [`SignalError::AlreadyArmed`] if the signal was not cancelled since
    /// it was last armed; otherwise the timer or subscription failure that
    /// prevented arming. A failed `arm` leaves nothing behind.
    pub fn arm(&mut self, waiter: &Waiter) -> Result<(), SignalError> {
        match self {
            WakeSignal::Deadline(alarm) => alarm.arm(waiter.handle()),
            WakeSignal::ActivityGrace(alarm) => alarm.arm(waiter.handle()),
        }
    }

    /// Stops the signal from firing and releases what it holds.
    pub fn cancel(&mut self) {
        match self {
            WakeSignal::Deadline(alarm) => alarm.cancel(),
            WakeSignal::ActivityGrace(alarm) => alarm.cancel(),
        }
    }

    /// Returns `true` between a successful `arm` and the next `cancel`.
    pub fn is_armed(&self) -> bool {
        match self {
            WakeSignal::Deadline(alarm) => alarm.armed.is_some(),
            WakeSignal::ActivityGrace(alarm) => alarm.armed.is_some(),
        }
    }
}

/// State of the [`WakeSignal::Deadline`] variant.
pub struct DeadlineAlarm {
    max_wait: Duration,
    scheduler: Arc<dyn Scheduler>,
    armed: Option<ArmedDeadline>,
}

struct ArmedDeadline {
    timer: DeadlineTimer,
    cancelled: Arc<AtomicBool>,
}

impl DeadlineAlarm {
    fn arm(&mut self, waiter: WakeHandle) -> Result<(), SignalError> {
        if self.armed.is_some() {
            return Err(SignalError::AlreadyArmed);
        }

        tracing::debug!(waiter = %waiter.id(), max_wait = ?self.max_wait, "deadline alarm armed");

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let timer = DeadlineTimer::arm(self.scheduler.as_ref(), self.max_wait, move || {
            if flag.load(Ordering::Acquire) {
                return;
            }

            waiter.wake(WakeReason::Deadline);
        })?;

        self.armed = Some(ArmedDeadline { timer, cancelled });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.cancelled.store(true, Ordering::Release);
            armed.timer.cancel();
        }
    }
}

/// State of the [`WakeSignal::ActivityGrace`] variant.
pub struct ActivityAlarm {
    queue: Arc<dyn OutputQueue>,
    grace: Duration,
    scheduler: Arc<dyn Scheduler>,
    armed: Option<Arc<Watch>>,
}

impl ActivityAlarm {
    fn arm(&mut self, waiter: WakeHandle) -> Result<(), SignalError> {
        if self.armed.is_some() {
            return Err(SignalError::AlreadyArmed);
        }

        tracing::debug!(waiter = %waiter.id(), grace = ?self.grace, "activity alarm looking at output queue");

        let watch = Watch::new(
            self.queue.clone(),
            self.grace,
            self.scheduler.clone(),
            waiter,
        );

        if let Err(err) = self.queue.subscribe(watch.conduit.clone()) {
            watch.timer.cancel();
            return Err(err.into());
        }

        self.armed = Some(watch);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(watch) = self.armed.take() {
            tracing::debug!(waiter = %watch.waiter.id(), "activity alarm stops looking at output queue");
            watch.stop();
        }
    }
}

/// Everything an armed activity alarm shares with its conduit and timer.
struct Watch {
    queue: Arc<dyn OutputQueue>,
    conduit: Arc<dyn ScriptConduit>,
    timer: GraceTimer,
    grace: Duration,
    waiter: WakeHandle,
    cancelled: AtomicBool,
    detached: AtomicBool,
}

impl Watch {
    fn new(
        queue: Arc<dyn OutputQueue>,
        grace: Duration,
        scheduler: Arc<dyn Scheduler>,
        waiter: WakeHandle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Watch>| {
            let on_fire = weak.clone();
            let timer = GraceTimer::new(scheduler, move || {
                if let Some(watch) = on_fire.upgrade() {
                    watch.grace_elapsed();
                }
            });

            Watch {
                queue,
                conduit: Arc::new(AlarmConduit {
                    watch: weak.clone(),
                }),
                timer,
                grace,
                waiter,
                cancelled: AtomicBool::new(false),
                detached: AtomicBool::new(false),
            }
        })
    }

    /// A script arrived: restart the grace window.
    fn output(&self) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }

        tracing::trace!(waiter = %self.waiter.id(), grace = ?self.grace, "output seen, restarting grace window");

        if let Err(err) = self.timer.reset(self.grace) {
            tracing::warn!(waiter = %self.waiter.id(), error = %err, "cannot restart grace window, waking now");
            self.detach();
            self.waiter.wake(WakeReason::Activity);
        }
    }

    fn grace_elapsed(&self) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }

        tracing::debug!(waiter = %self.waiter.id(), "output alarm went off");
        self.detach();
        self.waiter.wake(WakeReason::Activity);
    }

    fn stop(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.timer.cancel();
        self.detach();
    }

    /// Removes the conduit from the queue, once.
    fn detach(&self) {
        if !self.detached.swap(true, Ordering::AcqRel) {
            self.queue.unsubscribe(&self.conduit);
        }
    }
}

/// The conduit an activity alarm attaches to the output queue.
struct AlarmConduit {
    watch: Weak<Watch>,
}

impl ScriptConduit for AlarmConduit {
    fn rank(&self) -> Rank {
        Rank::PROCEDURAL
    }

    fn add_script(&self, _script: &Script) {
        if let Some(watch) = self.watch.upgrade() {
            watch.output();
        }
    }
}
