//! Timer dispatch reactor.
//!
//! This module implements the thread that fires every timer armed by the
//! long-poll core. The reactor is responsible for:
//! - keeping pending timers ordered by deadline,
//! - running each timer's callback once its deadline is reached,
//! - dropping timers that were cancelled before they fired.
//!
//! It runs independently from the threads serving poll requests and
//! communicates with them through commands sent over a channel.
//!
//! Most users only touch the [`ReactorHandle`], which implements
//! [`Scheduler`](crate::time::Scheduler).

mod core;
mod timer;

pub(crate) mod command;

pub use self::core::{ReactorHandle, TimerReactor};
pub(crate) use timer::TimerEntry;
