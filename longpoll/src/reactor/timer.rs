use crate::time::TimerTask;

use std::cmp::Ordering as CmpOrdering;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// An entry in a timer queue.
///
/// `TimerEntry` represents a callback scheduled at a specific
/// deadline. It is stored inside a binary heap ordered by deadline,
/// both by the reactor thread and by [`ManualClock`](crate::time::ManualClock).
///
/// The entry may be cancelled before it fires.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Insertion order, so that equal deadlines fire first-in first-out.
    pub(crate) seq: u64,

    /// Set by whichever side gets there first: the canceller or the
    /// dispatcher about to run the callback.
    pub(crate) cancelled: Arc<AtomicBool>,

    /// Callback to run when the deadline is reached.
    pub(crate) task: TimerTask,
}

impl TimerEntry {
    /// Returns `true` once the timer was cancelled or has already fired.
    pub(crate) fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Runs the callback unless the timer was cancelled first.
    ///
    /// A panicking callback is caught and logged so the dispatcher
    /// survives it. Returns `true` if the callback ran.
    pub(crate) fn fire(self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }

        if catch_unwind(AssertUnwindSafe(self.task)).is_err() {
            tracing::warn!("unexpected panic while raising timer callback");
        }

        true
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline) && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by insertion order.
    ///
    /// Note that the comparison is **reversed** so that a
    /// `BinaryHeap<TimerEntry>` behaves as a min-heap,
    /// where the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
