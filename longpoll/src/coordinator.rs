//! End-to-end orchestration of one long-poll request.

use crate::config::PollConfig;
use crate::error::{PollError, WriteError};
use crate::queue::OutputQueue;
use crate::signal::{SignalKind, WakeSignal};
use crate::time::Scheduler;
use crate::waiter::{WakeHandle, WakeReason, Waiter, WaiterId};

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a poll stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumption {
    /// Output was already pending when the poll started; it never blocked.
    OutputPending,

    /// The waiter was woken for the given reason.
    Woken(WakeReason),
}

/// Result of a completed poll, handed to the framing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub waiter: WaiterId,
    pub reason: Resumption,

    /// Whether the request thread actually blocked.
    pub blocked: bool,

    /// Wall-clock time from `begin` to resumption.
    pub elapsed: Duration,
}

/// The framing layer: serializes and writes whatever output is pending.
///
/// Called once per poll, after every alarm for that poll has been torn
/// down. An empty flush is normal when the poll was released by its
/// deadline with nothing produced.
pub trait Framing {
    /// Drains the session's pending output and writes it to the response.
    ///
    /// # Errors
    ///
    /// A [`WriteError`] is fatal for this request only.
    fn flush(&mut self, outcome: &PollOutcome) -> Result<(), WriteError>;
}

/// Orchestrates long-poll requests.
///
/// One coordinator is shared by every request; each call to
/// [`begin`](Self::begin) or [`poll`](Self::poll) builds its own waiter
/// and alarms, so concurrent requests share nothing but their session's
/// output queue.
pub struct PollCoordinator {
    config: PollConfig,
    scheduler: Arc<dyn Scheduler>,
}

impl PollCoordinator {
    /// Creates a coordinator arming its timers on `scheduler`.
    pub fn new(config: PollConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { config, scheduler }
    }

    /// The timings every poll started by this coordinator uses.
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Creates a waiter and arms its alarms without blocking.
    ///
    /// A deadline alarm is always armed. An activity-grace alarm is armed
    /// as well when `queue` is given. Either failing to arm is logged and
    /// the poll carries on with what it has: without the grace alarm the
    /// deadline alone releases the poll, and without the deadline alarm the
    /// blocking wait's ceiling is set to the maximum wait.
    pub fn begin(&self, queue: Option<Arc<dyn OutputQueue>>) -> PendingPoll {
        let started = Instant::now();
        let waiter = Waiter::new();
        let max_wait = self.config.max_wait();

        let mut signals = Vec::with_capacity(2);
        let mut ceiling = self.scheduler.ceiling(max_wait);

        let mut deadline = WakeSignal::deadline(max_wait, self.scheduler.clone());
        match deadline.arm(&waiter) {
            Ok(()) => signals.push(deadline),
            Err(err) => {
                tracing::warn!(waiter = %waiter.id(), error = %err, "cannot arm deadline alarm, relying on wait ceiling");
                ceiling = Some(max_wait);
            }
        }

        if let Some(queue) = &queue {
            let mut activity = WakeSignal::activity_grace(
                queue.clone(),
                self.config.grace_period(),
                self.scheduler.clone(),
            );

            match activity.arm(&waiter) {
                Ok(()) => signals.push(activity),
                Err(err) => {
                    tracing::warn!(waiter = %waiter.id(), error = %err, "cannot arm output alarm, deadline only");
                }
            }
        }

        tracing::debug!(waiter = %waiter.id(), signals = signals.len(), "poll started");

        PendingPoll {
            waiter,
            signals,
            queue,
            ceiling,
            started,
        }
    }

    /// Runs one poll end to end: arm, block, tear down, flush.
    ///
    /// # Errors
    ///
    /// [`PollError::Write`] if the framing layer fails to write.
    pub fn poll<F>(
        &self,
        queue: Option<Arc<dyn OutputQueue>>,
        framing: &mut F,
    ) -> Result<PollOutcome, PollError>
    where
        F: Framing + ?Sized,
    {
        self.begin(queue).wait(framing)
    }
}

/// A poll whose alarms are armed but which has not blocked yet.
///
/// Dropping a `PendingPoll` cancels every alarm it armed.
pub struct PendingPoll {
    waiter: Waiter,
    signals: Vec<WakeSignal>,
    queue: Option<Arc<dyn OutputQueue>>,
    ceiling: Option<Duration>,
    started: Instant,
}

impl PendingPoll {
    /// Identity of the poll's waiter, as reported in its outcome.
    pub fn waiter_id(&self) -> WaiterId {
        self.waiter.id()
    }

    /// A handle for interrupting the poll from another thread.
    pub fn wake_handle(&self) -> WakeHandle {
        self.waiter.handle()
    }

    /// Kinds of the alarms that were successfully armed.
    pub fn armed(&self) -> Vec<SignalKind> {
        self.signals.iter().map(WakeSignal::kind).collect()
    }

    /// Blocks until an alarm fires, then tears down and flushes.
    ///
    /// Returns without blocking if output is already pending and nothing
    /// has woken the poll yet. Every alarm armed by
    /// [`begin`](PollCoordinator::begin) is cancelled before `framing`
    /// runs, whichever of them fired.
    ///
    /// # Errors
    ///
    /// [`PollError::Write`] if the framing layer fails to write.
    pub fn wait<F>(mut self, framing: &mut F) -> Result<PollOutcome, PollError>
    where
        F: Framing + ?Sized,
    {
        let pending = self.waiter.woken_by().is_none()
            && self.queue.as_ref().is_some_and(|q| !q.is_empty());

        let reason = if pending {
            Resumption::OutputPending
        } else {
            Resumption::Woken(self.waiter.block(self.ceiling))
        };

        self.teardown();

        let outcome = PollOutcome {
            waiter: self.waiter.id(),
            reason,
            blocked: !pending,
            elapsed: self.started.elapsed(),
        };

        tracing::debug!(waiter = %outcome.waiter, reason = ?outcome.reason, elapsed = ?outcome.elapsed, "poll resumed");

        if let Err(err) = framing.flush(&outcome) {
            tracing::warn!(waiter = %outcome.waiter, error = %err, "flushing poll response failed");
            return Err(err.into());
        }

        Ok(outcome)
    }

    /// Abandons the poll without blocking, releasing every alarm.
    pub fn cancel(mut self) {
        self.waiter.wake(WakeReason::External);
        self.teardown();
    }

    fn teardown(&mut self) {
        for signal in &mut self.signals {
            signal.cancel();
        }

        self.signals.clear();
    }
}

impl Drop for PendingPoll {
    fn drop(&mut self) {
        self.teardown();
    }
}
