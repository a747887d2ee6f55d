//! CSP-style channels: rendezvous, buffering, and multi-channel `alt`.
//!
//! A [`Channel<T>`](channel::Channel) is a typed, cloneable handle over a
//! rendezvous or bounded-buffer link between producers and consumers.
//! Every read and write — single-channel or posted as one of several
//! candidates in an [`alt`] — is arbitrated by a single [`Offer`](offer::Offer)
//! per operation, which guarantees exactly one candidate ever wins.
//!
//! ```
//! use csp::channel::Channel;
//! use std::time::Duration;
//!
//! let ch: Channel<i32> = Channel::new();
//! let writer = {
//!     let ch = ch.clone();
//!     std::thread::spawn(move || ch.write(7, None))
//! };
//! assert_eq!(ch.read(Some(Duration::from_secs(1))).unwrap(), 7);
//! writer.join().unwrap().unwrap();
//! ```
//!
//! # Modules
//!
//! - [`channel`] — the typed channel itself: options, status, retirement.
//! - [`set`] — [`ChannelSet`](set::ChannelSet), the ordered group `Fair`
//!   priority needs.
//! - [`alt`] — the multi-channel select engine: `read_from_any`,
//!   `write_to_any`, `read_or_write_any`.
//! - [`priority`] — the `First`/`Any`/`Random`/`Fair` posting policies.
//! - [`offer`] — the Offer Arbiter: the two-phase commit primitive
//!   underneath every read, write, and alt.
//! - [`completer`] — the blocking/async result slot an `Offer` resolves
//!   into.
//! - [`request`] — the type-erased candidate/outcome types `alt` uses to
//!   mix channels of different payload types in one call.
//! - [`timer`] — deadlines and cooperative cancellation.
//! - [`registry`] — named channel lookup across a scope tree.
//! - [`executor`] — the seam background work (timers, cancel watchers) runs
//!   through.
//! - [`error`] — the closed error taxonomy every fallible operation returns.
pub mod alt;
pub mod channel;
pub mod completer;
pub mod error;
pub mod executor;
pub mod offer;
pub mod priority;
pub mod registry;
pub mod request;
pub mod set;
pub mod timer;

pub use channel::{Channel, ChannelOptions, ChannelStatus, OverflowPolicy};
pub use error::{CspError, CspResult};
pub use priority::Priority;
pub use set::ChannelSet;
pub use timer::CancelToken;
