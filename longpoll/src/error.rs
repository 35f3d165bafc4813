//! Error types for the long-poll core.
//!
//! Each layer has its own error enum; [`PollError`] is the only one a
//! caller of [`PollCoordinator::poll`](crate::PollCoordinator::poll) sees.
//! Degraded paths (a grace alarm that could not be armed, a subscription
//! refused by a closing session) are logged and absorbed by the
//! coordinator instead of being surfaced.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// The timer facility could not schedule a task.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The reactor thread has stopped and no longer accepts commands.
    #[error("timer reactor has shut down")]
    ReactorShutdown,

    /// The scheduler refused the task (resource exhaustion).
    #[error("timer facility refused to schedule: {0}")]
    Exhausted(String),

    /// The delay reaches past the furthest instant the clock can represent.
    #[error("timer delay {0:?} is out of range")]
    OutOfRange(Duration),
}

/// A pending-output queue refused a conduit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The queue belongs to a session that is being torn down.
    #[error("output queue is closed")]
    Closed,
}

/// Failure to arm a [`WakeSignal`](crate::WakeSignal).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// `arm` was called on a signal that is still armed.
    #[error("wake signal is already armed")]
    AlreadyArmed,

    /// The signal's timer could not be scheduled.
    #[error(transparent)]
    Timer(#[from] TimerError),

    /// The signal's conduit could not be attached to the output queue.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

/// Invalid poll configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration was supplied as a negative number of milliseconds.
    #[error("{name} must be non-negative, got {value}ms")]
    Negative { name: &'static str, value: i64 },

    /// An environment variable held something other than an integer.
    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },
}

/// The framing layer failed to write the response.
#[derive(Debug, Error)]
#[error("failed to write poll response: {source}")]
pub struct WriteError {
    #[from]
    source: io::Error,
}

impl WriteError {
    /// Returns the underlying I/O error.
    pub fn io(&self) -> &io::Error {
        &self.source
    }
}

/// Fatal error for a single long-poll request.
///
/// Other requests blocked at the same time are unaffected.
#[derive(Debug, Error)]
pub enum PollError {
    /// Writing the flushed output failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}
