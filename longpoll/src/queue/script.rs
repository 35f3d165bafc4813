use super::{OutputQueue, ScriptConduit};
use crate::error::SubscriptionError;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// One pending output fragment, opaque to the long-poll core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Script(String);

impl Script {
    /// The fragment's text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Script {
    fn from(body: String) -> Self {
        Self(body)
    }
}

impl From<&str> for Script {
    fn from(body: &str) -> Self {
        Self(body.to_owned())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A session's pending-output queue.
///
/// Producers call [`enqueue`](Self::enqueue) from any thread; the framing
/// layer empties the queue with [`drain`](Self::drain). Attached conduits
/// are notified after the script is stored, outside the queue lock, so a
/// slow or absent poller never holds a producer up.
///
/// Storing the script and snapshotting the conduits happen under one lock.
/// A conduit that subscribes concurrently with an `enqueue` therefore
/// either is notified of the script, or finds it already stored when it
/// next checks [`is_empty`](OutputQueue::is_empty).
#[derive(Default)]
pub struct ScriptQueue {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    scripts: VecDeque<Script>,

    /// Kept sorted by descending rank, subscription order within a rank.
    conduits: Vec<Arc<dyn ScriptConduit>>,

    closed: bool,
}

impl ScriptQueue {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a script and notifies every attached conduit.
    ///
    /// Returns `false` if the queue was closed and the script discarded.
    pub fn enqueue(&self, script: impl Into<Script>) -> bool {
        let script = script.into();

        let conduits = {
            let mut state = self.state.lock();

            if state.closed {
                return false;
            }

            state.scripts.push_back(script.clone());
            state.conduits.clone()
        };

        for conduit in &conduits {
            conduit.add_script(&script);
        }

        true
    }

    /// Removes and returns every pending script, oldest first.
    pub fn drain(&self) -> Vec<Script> {
        self.state.lock().scripts.drain(..).collect()
    }

    /// Number of pending scripts.
    pub fn len(&self) -> usize {
        self.state.lock().scripts.len()
    }

    /// Number of attached conduits.
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().conduits.len()
    }

    /// Closes the queue: detaches every conduit and refuses new ones.
    ///
    /// Scripts still pending can be drained; new ones are discarded.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.conduits.clear();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl OutputQueue for ScriptQueue {
    fn subscribe(&self, conduit: Arc<dyn ScriptConduit>) -> Result<(), SubscriptionError> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(SubscriptionError::Closed);
        }

        if state.conduits.iter().any(|c| Arc::ptr_eq(c, &conduit)) {
            return Ok(());
        }

        let rank = conduit.rank();
        let at = state
            .conduits
            .iter()
            .position(|c| c.rank() < rank)
            .unwrap_or(state.conduits.len());

        state.conduits.insert(at, conduit);
        Ok(())
    }

    fn unsubscribe(&self, conduit: &Arc<dyn ScriptConduit>) -> bool {
        let mut state = self.state.lock();

        match state.conduits.iter().position(|c| Arc::ptr_eq(c, conduit)) {
            Some(at) => {
                state.conduits.remove(at);
                true
            }
            None => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.state.lock().scripts.is_empty()
    }
}
