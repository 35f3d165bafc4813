//! # Longpoll
//!
//! **Longpoll** is the wake-coordination core of a server-push
//! ("reverse AJAX") transport. A browser's request is held open on a
//! blocked thread; the server releases it as soon as new output is ready,
//! but never later than a configured maximum wait.
//!
//! Output is not flushed the instant it arrives. After each script is
//! enqueued the poll waits a short grace window for more, so that a burst
//! of near-simultaneous updates goes out as one response instead of many.
//!
//! The crate provides:
//!
//! - A **timer reactor** that dispatches timer callbacks on its own thread
//! - **Deadline and grace timers** over an injectable [`time::Scheduler`]
//! - A **[`Waiter`]** whose wake is idempotent across racing sources
//! - **[`WakeSignal`]s**, the deadline and activity-grace triggers
//! - A **[`PollCoordinator`]** running one poll end to end
//!
//! Framing the response for the wire and session bookkeeping are left to
//! the caller, through [`Framing`] and [`queue::OutputQueue`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use longpoll::queue::ScriptQueue;
//! use longpoll::{PollConfig, PollCoordinator, TimerReactor};
//! use std::sync::Arc;
//!
//! let reactor = TimerReactor::start()?;
//! let coordinator = PollCoordinator::new(PollConfig::from_env()?, Arc::new(reactor.handle()));
//!
//! let queue = Arc::new(ScriptQueue::new());
//! let outcome = coordinator.poll(Some(queue.clone()), &mut framing)?;
//! ```
//!
//! ## Modules
//!
//! - [`queue`]: Pending-output queues and ranked conduits
//! - [`time`]: Timer capability, deadline and grace timers, virtual clock

mod config;
mod coordinator;
mod error;
mod reactor;
mod signal;
mod waiter;

pub mod queue;
pub mod time;

pub use config::{ENV_GRACE_MS, ENV_MAX_WAIT_MS, PollConfig, PollConfigBuilder};
pub use coordinator::{Framing, PendingPoll, PollCoordinator, PollOutcome, Resumption};
pub use error::{ConfigError, PollError, SignalError, SubscriptionError, TimerError, WriteError};
pub use reactor::{ReactorHandle, TimerReactor};
pub use signal::{ActivityAlarm, DeadlineAlarm, SignalKind, WakeSignal};
pub use waiter::{WaiterId, WakeHandle, WakeReason, Waiter};
