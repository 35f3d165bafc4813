//! The blocked side of a long-poll request.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Waiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waiter-{}", self.0)
    }
}

/// What resumed a [`Waiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WakeReason {
    /// The poll's maximum wait elapsed.
    Deadline,

    /// Output arrived and the grace window after it passed quietly.
    Activity,

    /// Something outside the poll's own alarms interrupted the wait.
    External,

    /// The blocking wait's own safety net elapsed before any alarm fired.
    Ceiling,
}

impl fmt::Display for WakeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WakeReason::Deadline => "deadline",
            WakeReason::Activity => "activity",
            WakeReason::External => "external",
            WakeReason::Ceiling => "ceiling",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Blocked,
    Woken(WakeReason),
}

struct Inner {
    id: WaiterId,
    state: Mutex<State>,
    condvar: Condvar,
}

impl Inner {
    /// First caller wins; every later call returns `false`.
    fn wake(&self, reason: WakeReason) -> bool {
        let mut state = self.state.lock();

        if let State::Woken(_) = *state {
            return false;
        }

        *state = State::Woken(reason);
        self.condvar.notify_all();

        tracing::debug!(waiter = %self.id, %reason, "waiter woken");
        true
    }

    fn woken_by(&self) -> Option<WakeReason> {
        match *self.state.lock() {
            State::Woken(reason) => Some(reason),
            _ => None,
        }
    }
}

/// One blocked long-poll request.
///
/// A waiter moves `Idle -> Blocked -> Woken` and never leaves `Woken`.
/// [`wake`](Self::wake) is idempotent: the first call, from whichever alarm
/// or thread gets there first, records its reason and resumes the blocked
/// thread; later calls change nothing and report `false`.
///
/// A wake that lands before [`block`](Self::block) is called is latched,
/// and `block` then returns at once. This closes the window between
/// deciding to block and actually blocking.
///
/// The waiter is owned by the request's thread. Alarms and other threads
/// reach it through a [`WakeHandle`], which does not keep it alive.
pub struct Waiter {
    inner: Arc<Inner>,
}

impl Waiter {
    /// Creates an idle waiter with a fresh identity.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: WaiterId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
                state: Mutex::new(State::Idle),
                condvar: Condvar::new(),
            }),
        }
    }

    /// The waiter's identity.
    pub fn id(&self) -> WaiterId {
        self.inner.id
    }

    /// Returns a weak handle that can wake this waiter from any thread.
    pub fn handle(&self) -> WakeHandle {
        WakeHandle {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Suspends the calling thread until the waiter is woken.
    ///
    /// `ceiling` bounds the wait as a last resort; when it elapses first,
    /// the waiter records [`WakeReason::Ceiling`] as the winning wake. A
    /// ceiling too far out to be represented leaves the wait unbounded.
    /// Returns the reason recorded by the winning wake.
    pub fn block(&self, ceiling: Option<Duration>) -> WakeReason {
        let mut state = self.inner.state.lock();

        if let State::Woken(reason) = *state {
            return reason;
        }

        *state = State::Blocked;

        let deadline = ceiling.and_then(|c| Instant::now().checked_add(c));

        loop {
            if let State::Woken(reason) = *state {
                return reason;
            }

            match deadline {
                Some(deadline) => {
                    let result = self.inner.condvar.wait_until(&mut state, deadline);

                    if result.timed_out() {
                        if let State::Woken(reason) = *state {
                            return reason;
                        }

                        *state = State::Woken(WakeReason::Ceiling);
                        tracing::debug!(waiter = %self.inner.id, "waiter hit its ceiling");
                        return WakeReason::Ceiling;
                    }
                }
                None => self.inner.condvar.wait(&mut state),
            }
        }
    }

    /// Wakes the waiter. Returns `true` only for the call that won.
    pub fn wake(&self, reason: WakeReason) -> bool {
        self.inner.wake(reason)
    }

    /// Returns `true` while a thread is suspended in [`block`](Self::block).
    pub fn is_blocked(&self) -> bool {
        *self.inner.state.lock() == State::Blocked
    }

    /// The reason recorded by the winning wake, if any.
    pub fn woken_by(&self) -> Option<WakeReason> {
        self.inner.woken_by()
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("id", &self.inner.id)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

/// A weak, cloneable reference used to wake a [`Waiter`].
///
/// Waking through a handle whose waiter is gone is a no-op.
#[derive(Clone)]
pub struct WakeHandle {
    id: WaiterId,
    inner: Weak<Inner>,
}

impl WakeHandle {
    /// Identity of the waiter this handle points at.
    pub fn id(&self) -> WaiterId {
        self.id
    }

    /// Wakes the waiter. Returns `true` only for the call that won.
    pub fn wake(&self, reason: WakeReason) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.wake(reason))
    }

    /// The reason recorded by the winning wake, if the waiter still exists
    /// and has been woken.
    pub fn woken_by(&self) -> Option<WakeReason> {
        self.inner.upgrade().and_then(|inner| inner.woken_by())
    }
}

impl fmt::Debug for WakeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeHandle").field("id", &self.id).finish()
    }
}
