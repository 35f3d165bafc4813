//! Pending-output queues and the conduits that observe them.
//!
//! A session's pending output is a queue of [`Script`] fragments that
//! application code appends to at any time, from any thread. The long-poll
//! core never reads or removes fragments; it only attaches a
//! [`ScriptConduit`] while a poll is blocked, so that it hears about each
//! new fragment as it is enqueued.
//!
//! [`OutputQueue`] is the narrow contract the core relies on.
//! [`ScriptQueue`] is the in-memory implementation used by sessions.

mod conduit;
mod script;

pub use conduit::{Rank, ScriptConduit};
pub use script::{Script, ScriptQueue};

use crate::error::SubscriptionError;

use std::sync::Arc;

/// The observation side of a session's pending-output queue.
pub trait OutputQueue: Send + Sync {
    /// Attaches `conduit` so it is told about every script enqueued from
    /// now on. Attaching the same conduit twice keeps a single registration.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Closed`] if the queue's session is
    /// being torn down.
    fn subscribe(&self, conduit: Arc<dyn ScriptConduit>) -> Result<(), SubscriptionError>;

    /// Detaches `conduit`. Returns `false` if it was not attached.
    fn unsubscribe(&self, conduit: &Arc<dyn ScriptConduit>) -> bool;

    /// Returns `true` if no script is waiting to be flushed.
    fn is_empty(&self) -> bool;
}
