//! Deferred values with `then` chaining and settlement combinators.
//!
//! A [`Promise`] settles once, to a value or a reason. Every handler runs on
//! a later turn of a [`Schedule`]r, in the order it was registered, and never
//! inside the call that settled the promise. [`EventLoop`] is a
//! single-threaded FIFO scheduler you drive yourself.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{any, race, EventLoop, Item, Promise};
//!
//! let event_loop = EventLoop::new();
//! let handle = event_loop.handle();
//!
//! let (slow, _never) = Promise::<&str, &str>::pending(&handle);
//! let winner = race(&handle, [Item::from(slow), Item::Value("now")]);
//! assert_eq!(event_loop.block_on(&winner), Ok(Ok("now")));
//!
//! let first_ok = any(
//!     &handle,
//!     [
//!         Promise::rejected(&handle, "down"),
//!         Promise::resolved(&handle, "up"),
//!     ],
//! );
//! assert_eq!(event_loop.block_on(&first_ok), Ok(Ok("up")));
//! ```
use thiserror::Error;

mod chain;
pub mod combinator;
pub mod promise;
pub mod scheduler;

pub use combinator::{all, all_settled, any, race, AggregateError, Item, Settled};
pub use promise::{Promise, Resolver, State, Thenable};
pub use scheduler::{Config, EventLoop, Handle, Schedule, Task};

/// Failures of the event loop itself, as opposed to promise rejections.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("The event loop went idle while the promise was still pending")]
    Stalled,
    #[error("The event loop stopped after {0} turns with work still queued")]
    TurnLimitExceeded(usize),
}
