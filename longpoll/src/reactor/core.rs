use super::command::Command;
use super::timer::TimerEntry;
use crate::error::TimerError;
use crate::time::{Scheduler, TimerHandle, TimerTask};

use std::collections::BinaryHeap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The reactor loop, owned by its dedicated thread.
struct Reactor {
    receiver: Receiver<Command>,
    timers: BinaryHeap<TimerEntry>,

    /// Set when a `Purge` command arrived since the last sweep.
    dirty: bool,
}

impl Reactor {
    fn new(receiver: Receiver<Command>) -> Self {
        Self {
            receiver,
            timers: BinaryHeap::new(),
            dirty: false,
        }
    }

    /// Runs until a shutdown command arrives or every sender is gone.
    fn run(&mut self) {
        loop {
            let timeout = self
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()));

            let first = match timeout {
                Some(timeout) => match self.receiver.recv_timeout(timeout) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                },
                None => match self.receiver.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => return,
                },
            };

            if let Some(cmd) = first {
                if !self.handle(cmd) {
                    return;
                }
            }

            while let Ok(cmd) = self.receiver.try_recv() {
                if !self.handle(cmd) {
                    return;
                }
            }

            if self.dirty {
                self.timers.retain(|t| !t.is_done());
                self.dirty = false;
            }

            self.fire_due();
        }
    }

    /// Applies one command. Returns `false` on shutdown.
    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::SetTimer(entry) => {
                self.timers.push(entry);
            }
            Command::Purge => {
                self.dirty = true;
            }
            Command::Shutdown => {
                tracing::debug!(pending = self.timers.len(), "timer reactor shutting down");
                return false;
            }
        }

        true
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        let mut fired = 0usize;

        while let Some(timer) = self.timers.peek() {
            if timer.deadline > now {
                break;
            }

            let Some(timer) = self.timers.pop() else {
                break;
            };

            if timer.fire() {
                fired += 1;
            }
        }

        if fired > 0 {
            tracing::trace!(fired, "timers fired");
        }
    }
}

/// Cloneable handle used to schedule timers on a [`TimerReactor`].
///
/// The handle is the production [`Scheduler`]: timer callbacks run on the
/// reactor thread, asynchronously to the thread that armed them.
#[derive(Clone)]
pub struct ReactorHandle {
    sender: Sender<Command>,
    seq: Arc<AtomicU64>,
}

impl ReactorHandle {
    fn send(&self, cmd: Command) -> Result<(), TimerError> {
        self.sender
            .send(cmd)
            .map_err(|_| TimerError::ReactorShutdown)
    }
}

impl Scheduler for ReactorHandle {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Result<TimerHandle, TimerError> {
        let deadline = Instant::now()
            .checked_add(delay)
            .ok_or(TimerError::OutOfRange(delay))?;
        let cancelled = Arc::new(AtomicBool::new(false));

        self.send(Command::SetTimer(TimerEntry {
            deadline,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            cancelled: cancelled.clone(),
            task,
        }))?;

        let purge = self.sender.clone();
        Ok(TimerHandle::new(cancelled).on_cancel(move || {
            let _ = purge.send(Command::Purge);
        }))
    }
}

/// Owner of the timer-dispatch thread.
///
/// Dropping the reactor shuts the thread down and joins it. Timers that
/// have not fired by then are discarded; their callbacks never run.
///
/// # Examples
///
/// ```rust,ignore
/// let reactor = TimerReactor::start()?;
/// let coordinator = PollCoordinator::new(config, Arc::new(reactor.handle()));
/// ```
pub struct TimerReactor {
    handle: ReactorHandle,
    thread: Option<JoinHandle<()>>,
}

impl TimerReactor {
    /// Spawns the reactor thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start() -> io::Result<Self> {
        let (sender, receiver) = channel();

        let thread = thread::Builder::new()
            .name("longpoll-timer".into())
            .spawn(move || Reactor::new(receiver).run())?;

        tracing::debug!("timer reactor started");

        Ok(Self {
            handle: ReactorHandle {
                sender,
                seq: Arc::new(AtomicU64::new(0)),
            },
            thread: Some(thread),
        })
    }

    /// Returns a handle for scheduling timers on this reactor.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }
}

impl Drop for TimerReactor {
    /// Stops the reactor loop and waits for the thread to exit.
    fn drop(&mut self) {
        let _ = self.handle.send(Command::Shutdown);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("timer reactor thread panicked");
            }
        }
    }
}
