use super::Script;

use std::fmt;

/// Ordering priority of a [`ScriptConduit`].
///
/// Conduits with a higher rank hear about a script before conduits with a
/// lower one. Conduits of equal rank are told in the order they subscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(pub u8);

impl Rank {
    /// Conduits that do slow work per script, such as writing to a socket.
    pub const SLOW: Rank = Rank(1);

    /// Conduits that only run a short procedure per script.
    pub const PROCEDURAL: Rank = Rank(5);

    /// Conduits that do almost nothing per script.
    pub const FAST: Rank = Rank(10);
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ranked observer of a pending-output queue.
///
/// Conduits are told about every script enqueued while they are attached.
/// They only observe: the script stays in the queue, in order, for the
/// framing layer to flush.
///
/// `add_script` is called on the producer's thread, outside any queue
/// lock, and must not block.
pub trait ScriptConduit: Send + Sync {
    /// The conduit's priority among the queue's observers.
    fn rank(&self) -> Rank;

    /// Called once for each script enqueued while the conduit is attached.
    fn add_script(&self, script: &Script);
}
