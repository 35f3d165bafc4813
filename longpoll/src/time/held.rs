use super::{Scheduler, TimerHandle, TimerTask};
use crate::error::TimerError;

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// A scheduler that never fires on its own and ignores cancellation.
///
/// Tasks are handed back by [`take`](Self::take) and can then be run in any
/// order, including after their handle was cancelled, which is what a
/// dispatch thread racing a `cancel` looks like.
#[derive(Default)]
pub(crate) struct HeldScheduler {
    tasks: Mutex<Vec<TimerTask>>,
}

impl HeldScheduler {
    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Removes every held task, oldest first.
    pub(crate) fn take(&self) -> Vec<TimerTask> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

impl Scheduler for HeldScheduler {
    fn schedule(&self, _delay: Duration, task: TimerTask) -> Result<TimerHandle, TimerError> {
        self.tasks.lock().push(task);
        Ok(TimerHandle::new(Arc::new(AtomicBool::new(false))))
    }
}
