use super::timer::TimerEntry;

/// Messages accepted by the reactor thread.
pub(crate) enum Command {
    /// Adds a timer to the heap.
    SetTimer(TimerEntry),

    /// Asks the reactor to drop cancelled timers before their deadline.
    Purge,

    /// Stops the reactor loop.
    Shutdown,
}
