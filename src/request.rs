//! The tagged request union of spec.md §3 ("Request — tagged union
//! {Read(channel), Write(channel, value)} carrying a reference to its
//! Offer") and the type-erased payload an [`Offer`](crate::offer::Offer)
//! carries so one Offer can be shared across requests against channels of
//! different payload types (spec.md §4.3's `readOrWriteAny` over
//! `Channel<i32>`, `Channel<String>`, `Channel<i64>` in the same alt).
use std::any::Any;
use std::sync::Arc;

use crate::channel::Channel;
use crate::offer::{ChannelId, Offer};

/// What an [`Offer`] actually carries once committed: either the value read
/// (boxed, downcast by the caller who statically knows the channel's `T`)
/// or a bare confirmation that a write was accepted. This is the "tagged
/// union completer" spec.md §9 asks for, built without reflection: the
/// caller who constructed the original read/write request is the only one
/// who ever downcasts, and it always downcasts to the type it itself
/// supplied.
pub enum AltValue {
    Read(Box<dyn Any + Send>),
    Write,
}

/// The shared arbiter every pending entry in a [`Channel`] references.
/// Every request — even a plain single-channel call — has one.
pub(crate) type ChannelOffer = Offer<AltValue>;

/// A single candidate posted by the Alt Engine: "try this channel, either
/// as a read or a write", type-erased so a list of candidates can mix
/// channels of different payload types. Built via [`read`] and [`write`],
/// never constructed directly.
pub trait Candidate: Send {
    #[doc(hidden)]
    fn channel_id(&self) -> ChannelId;
    /// Posts this candidate against `offer` and returns a closure that
    /// removes the now-stale pending entry from the channel's queue if the
    /// Offer ends up resolving some other way (spec.md §8 scenario 2: "no
    /// spurious reader left queued on any channel" after a timed-out alt).
    /// Calling the closure after this candidate already won is a no-op.
    #[doc(hidden)]
    fn post(self: Box<Self>, offer: Arc<ChannelOffer>) -> Box<dyn FnOnce() + Send>;
}

struct ReadCandidate<T> {
    channel: Channel<T>,
}

impl<T: Send + 'static> Candidate for ReadCandidate<T> {
    fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    fn post(self: Box<Self>, offer: Arc<ChannelOffer>) -> Box<dyn FnOnce() + Send> {
        self.channel.post_read(offer.clone());
        let channel = self.channel;
        Box::new(move || channel.purge_read(&offer))
    }
}

struct WriteCandidate<T> {
    channel: Channel<T>,
    value: T,
}

impl<T: Send + 'static> Candidate for WriteCandidate<T> {
    fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    fn post(self: Box<Self>, offer: Arc<ChannelOffer>) -> Box<dyn FnOnce() + Send> {
        self.channel.post_write(self.value, offer.clone());
        let channel = self.channel;
        Box::new(move || channel.purge_write(&offer))
    }
}

/// Builds a read candidate for [`read_or_write_any`](crate::alt::read_or_write_any).
pub fn read<T: Send + 'static>(channel: &Channel<T>) -> Box<dyn Candidate> {
    Box::new(ReadCandidate {
        channel: channel.clone(),
    })
}

/// Builds a write candidate for [`read_or_write_any`](crate::alt::read_or_write_any).
pub fn write<T: Send + 'static>(channel: &Channel<T>, value: T) -> Box<dyn Candidate> {
    Box::new(WriteCandidate {
        channel: channel.clone(),
        value,
    })
}

/// The outcome of a committed [`read_or_write_any`](crate::alt::read_or_write_any):
/// which posted candidate won, which channel it was against, and — for a
/// read — the boxed value, downcast by the caller back to the type it
/// built that candidate with.
pub enum AnyOutcome {
    Read {
        index: usize,
        channel: ChannelId,
        value: Box<dyn Any + Send>,
    },
    Write {
        index: usize,
        channel: ChannelId,
    },
}

impl AnyOutcome {
    /// Downcasts a winning read's value to `T`. Panics if called against a
    /// `Write` outcome or against the wrong `T` — both are programmer
    /// errors: the caller built the candidate list and knows exactly which
    /// index carries which type.
    pub fn into_read<T: 'static>(self) -> (usize, ChannelId, T) {
        match self {
            AnyOutcome::Read {
                index,
                channel,
                value,
            } => {
                let value = *value
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("AnyOutcome::into_read: type mismatch"));
                (index, channel, value)
            }
            AnyOutcome::Write { .. } => panic!("AnyOutcome::into_read called on a Write outcome"),
        }
    }

    pub fn index(&self) -> usize {
        match self {
            AnyOutcome::Read { index, .. } => *index,
            AnyOutcome::Write { index, .. } => *index,
        }
    }

    pub fn channel(&self) -> ChannelId {
        match self {
            AnyOutcome::Read { channel, .. } => *channel,
            AnyOutcome::Write { channel, .. } => *channel,
        }
    }
}
