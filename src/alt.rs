//! The Alt Engine: multi-channel `select` over reads, writes, or a mix of
//! both, per spec.md §4.3.
//!
//! All three entry points share one shape: build a single [`Offer`] shared
//! across every candidate, post candidates in priority order, wait for the
//! Offer to resolve, then unwrap the winning value. The heavy lifting —
//! deciding which candidate actually gets the pairing — lives in
//! [`crate::channel::state::matchmake`]; this module only ever decides
//! *posting order* and *what the caller gets back*.
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::Channel;
use crate::error::{CspError, CspResult};
use crate::offer::Offer;
use crate::priority::{Priority, posting_order};
use crate::request::{AltValue, Candidate, ChannelOffer};
use crate::set::ChannelSet;
use crate::timer::{CancelToken, spawn_cancel_watch, spawn_deadline};

fn post_and_wait(
    offer: Arc<ChannelOffer>,
    deadline: Option<Duration>,
    cancel: Option<CancelToken>,
) -> CspResult<(u64, AltValue)> {
    let deadline_at = deadline.map(|d| Instant::now() + d);
    if let Some(at) = deadline_at {
        spawn_deadline(offer.clone(), at);
    }
    if let Some(token) = cancel {
        spawn_cancel_watch(offer.clone(), token);
    }
    offer.mark_probe_complete();
    offer.completer().wait(deadline_at)
}

fn downcast_read<T: 'static>(value: AltValue) -> T {
    match value {
        AltValue::Read(boxed) => *boxed
            .downcast::<T>()
            .unwrap_or_else(|_| panic!("alt: type mismatch on committed read")),
        AltValue::Write => unreachable!("a read candidate can only commit to a Read value"),
    }
}

/// Reads from whichever of `channels` is ready first. `priority == Fair`
/// requires `set` to be `Some` (spec.md §4.3: Fair is only meaningful
/// relative to a [`ChannelSet`]'s persistent cursor).
pub fn read_from_any<T: Send + 'static>(
    channels: &[Channel<T>],
    priority: Priority,
    deadline: Option<Duration>,
    set: Option<&ChannelSet<T>>,
) -> CspResult<(usize, T)> {
    read_from_any_impl(channels, priority, deadline, set, None)
}

/// Same as [`read_from_any`], additionally racing `cancel` against the
/// deadline and any pairing (spec.md §4.4).
pub fn read_from_any_cancellable<T: Send + 'static>(
    channels: &[Channel<T>],
    priority: Priority,
    deadline: Option<Duration>,
    set: Option<&ChannelSet<T>>,
    cancel: CancelToken,
) -> CspResult<(usize, T)> {
    read_from_any_impl(channels, priority, deadline, set, Some(cancel))
}

fn read_from_any_impl<T: Send + 'static>(
    channels: &[Channel<T>],
    priority: Priority,
    deadline: Option<Duration>,
    set: Option<&ChannelSet<T>>,
    cancel: Option<CancelToken>,
) -> CspResult<(usize, T)> {
    if channels.is_empty() {
        return Err(CspError::InvalidOperation("read_from_any: empty channel list"));
    }
    let cursor = match (priority, set) {
        (Priority::Fair, None) => {
            return Err(CspError::InvalidOperation(
                "Priority::Fair requires an explicit ChannelSet",
            ));
        }
        (Priority::Fair, Some(set)) => set.cursor(),
        _ => 0,
    };

    let offer: Arc<ChannelOffer> = Arc::new(Offer::new());
    let order = posting_order(channels.len(), priority, cursor);
    let mut posted = Vec::with_capacity(channels.len());
    for &index in &order {
        channels[index].post_read(offer.clone());
        posted.push(index);
        if !offer.is_probing() {
            break;
        }
    }

    let result = post_and_wait(offer.clone(), deadline, cancel);
    // Every posted candidate but the eventual winner is left with a stale
    // queue entry; purging is idempotent (a no-op for whichever channel's
    // matchmake already popped it), so it is safe to run unconditionally
    // rather than only on the error path.
    for index in posted {
        channels[index].purge_read(&offer);
    }
    let (winner, value) = result?;
    let index = channels
        .iter()
        .position(|c| c.id() == winner)
        .expect("committed channel id must be one of the posted candidates");
    if let Some(set) = set {
        set.advance_cursor(index, channels.len());
    }
    Ok((index, downcast_read::<T>(value)))
}

/// Writes the first ready value among `values`/`channels` (paired
/// positionally) and returns the winning index.
pub fn write_to_any<T: Send + 'static>(
    channels: &[Channel<T>],
    values: Vec<T>,
    priority: Priority,
    deadline: Option<Duration>,
    set: Option<&ChannelSet<T>>,
) -> CspResult<usize> {
    write_to_any_impl(channels, values, priority, deadline, set, None)
}

/// Same as [`write_to_any`], additionally racing `cancel` against the
/// deadline and any pairing (spec.md §4.4).
pub fn write_to_any_cancellable<T: Send + 'static>(
    channels: &[Channel<T>],
    values: Vec<T>,
    priority: Priority,
    deadline: Option<Duration>,
    set: Option<&ChannelSet<T>>,
    cancel: CancelToken,
) -> CspResult<usize> {
    write_to_any_impl(channels, values, priority, deadline, set, Some(cancel))
}

fn write_to_any_impl<T: Send + 'static>(
    channels: &[Channel<T>],
    mut values: Vec<T>,
    priority: Priority,
    deadline: Option<Duration>,
    set: Option<&ChannelSet<T>>,
    cancel: Option<CancelToken>,
) -> CspResult<usize> {
    if channels.is_empty() || channels.len() != values.len() {
        return Err(CspError::InvalidOperation(
            "write_to_any: channel and value lists must be equal length and non-empty",
        ));
    }
    let cursor = match (priority, set) {
        (Priority::Fair, None) => {
            return Err(CspError::InvalidOperation(
                "Priority::Fair requires an explicit ChannelSet",
            ));
        }
        (Priority::Fair, Some(set)) => set.cursor(),
        _ => 0,
    };

    let offer: Arc<ChannelOffer> = Arc::new(Offer::new());
    let order = posting_order(channels.len(), priority, cursor);
    // Values are moved out as each candidate posts, in posting order; this
    // is why `values` is taken by value rather than by reference.
    let mut slots: Vec<Option<T>> = values.drain(..).map(Some).collect();
    let mut posted = Vec::with_capacity(channels.len());
    for &index in &order {
        let value = slots[index].take().expect("each index posted at most once");
        channels[index].post_write(value, offer.clone());
        posted.push(index);
        if !offer.is_probing() {
            break;
        }
    }

    let result = post_and_wait(offer.clone(), deadline, cancel);
    for index in posted {
        channels[index].purge_write(&offer);
    }
    let (winner, _) = result?;
    let index = channels
        .iter()
        .position(|c| c.id() == winner)
        .expect("committed channel id must be one of the posted candidates");
    if let Some(set) = set {
        set.advance_cursor(index, channels.len());
    }
    Ok(index)
}

/// Mixes reads and writes across channels of potentially different payload
/// types in one alt, per spec.md §4.3's `readOrWriteAny`. `Fair` priority
/// is not available here — there is no [`ChannelSet`] to carry a cursor
/// across a heterogeneous candidate list.
pub fn read_or_write_any(
    candidates: Vec<Box<dyn Candidate>>,
    priority: Priority,
    deadline: Option<Duration>,
) -> CspResult<crate::request::AnyOutcome> {
    read_or_write_any_impl(candidates, priority, deadline, None)
}

/// Same as [`read_or_write_any`], additionally racing `cancel` against the
/// deadline and any pairing (spec.md §4.4).
pub fn read_or_write_any_cancellable(
    candidates: Vec<Box<dyn Candidate>>,
    priority: Priority,
    deadline: Option<Duration>,
    cancel: CancelToken,
) -> CspResult<crate::request::AnyOutcome> {
    read_or_write_any_impl(candidates, priority, deadline, Some(cancel))
}

fn read_or_write_any_impl(
    candidates: Vec<Box<dyn Candidate>>,
    priority: Priority,
    deadline: Option<Duration>,
    cancel: Option<CancelToken>,
) -> CspResult<crate::request::AnyOutcome> {
    use crate::request::AnyOutcome;

    if candidates.is_empty() {
        return Err(CspError::InvalidOperation(
            "read_or_write_any: empty candidate list",
        ));
    }
    if priority == Priority::Fair {
        return Err(CspError::InvalidOperation(
            "Priority::Fair requires an explicit ChannelSet",
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for candidate in &candidates {
        if !seen.insert(candidate.channel_id()) {
            return Err(CspError::InvalidOperation(
                "read_or_write_any: the same channel cannot appear twice in one alt",
            ));
        }
    }

    let offer: Arc<ChannelOffer> = Arc::new(Offer::new());
    let order = posting_order(candidates.len(), priority, 0);
    let channel_ids: Vec<u64> = candidates.iter().map(|c| c.channel_id()).collect();
    let mut slots: Vec<Option<Box<dyn Candidate>>> = candidates.into_iter().map(Some).collect();
    let mut purges: Vec<Box<dyn FnOnce() + Send>> = Vec::with_capacity(channel_ids.len());
    for &index in &order {
        let candidate = slots[index].take().expect("each index posted at most once");
        purges.push(candidate.post(offer.clone()));
        if !offer.is_probing() {
            break;
        }
    }

    let result = post_and_wait(offer, deadline, cancel);
    for purge in purges {
        purge();
    }
    let (winner, value) = result?;
    let index = channel_ids
        .iter()
        .position(|&id| id == winner)
        .expect("committed channel id must be one of the posted candidates");
    Ok(match value {
        AltValue::Read(boxed) => AnyOutcome::Read {
            index,
            channel: winner,
            value: boxed,
        },
        AltValue::Write => AnyOutcome::Write {
            index,
            channel: winner,
        },
    })
}

#[cfg(feature = "async")]
pub use r#async::{
    ReadAnyFuture, ReadOrWriteAnyFuture, WriteAnyFuture, read_from_any_future,
    read_from_any_future_cancellable, read_or_write_any_future, read_or_write_any_future_cancellable,
    write_to_any_future, write_to_any_future_cancellable,
};

/// Async counterparts of [`read_from_any`]/[`write_to_any`]/
/// [`read_or_write_any`]: all posting and timer setup happens synchronously,
/// exactly as in the blocking `_impl` functions above, and only the final
/// wait becomes a [`Future`] polling the shared [`Offer`]'s completer
/// directly (see [`Completer::poll`](crate::completer::Completer::poll)).
/// Dropping a future before it resolves purges every posted-but-unwon
/// candidate, the same cleanup the blocking path runs unconditionally after
/// `post_and_wait`.
#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn find_index<T>(channels: &[Channel<T>], winner: u64) -> usize {
        channels
            .iter()
            .position(|c| c.id() == winner)
            .expect("committed channel id must be one of the posted candidates")
    }

    #[must_use = "futures do nothing unless polled"]
    pub struct ReadAnyFuture<'a, T> {
        channels: &'a [Channel<T>],
        set: Option<&'a ChannelSet<T>>,
        offer: Arc<ChannelOffer>,
        posted: Vec<usize>,
        done: bool,
    }

    impl<T> Unpin for ReadAnyFuture<'_, T> {}

    impl<T: Send + 'static> Future for ReadAnyFuture<'_, T> {
        type Output = CspResult<(usize, T)>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            match self.offer.completer().poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(result) => {
                    self.done = true;
                    Poll::Ready(result.map(|(winner, value)| {
                        let index = find_index(self.channels, winner);
                        if let Some(set) = self.set {
                            set.advance_cursor(index, self.channels.len());
                        }
                        (index, downcast_read::<T>(value))
                    }))
                }
            }
        }
    }

    impl<T> Drop for ReadAnyFuture<'_, T> {
        fn drop(&mut self) {
            if !self.done {
                for &index in &self.posted {
                    self.channels[index].purge_read(&self.offer);
                }
            }
        }
    }

    /// Posts `channels` in `priority` order and returns a future resolving
    /// to the winning index/value — the async counterpart to
    /// [`read_from_any`](super::read_from_any).
    pub fn read_from_any_future<'a, T: Send + 'static>(
        channels: &'a [Channel<T>],
        priority: Priority,
        deadline: Option<Duration>,
        set: Option<&'a ChannelSet<T>>,
    ) -> CspResult<ReadAnyFuture<'a, T>> {
        read_from_any_future_impl(channels, priority, deadline, set, None)
    }

    /// Same as [`read_from_any_future`], additionally racing `cancel`
    /// against the deadline and any pairing.
    pub fn read_from_any_future_cancellable<'a, T: Send + 'static>(
        channels: &'a [Channel<T>],
        priority: Priority,
        deadline: Option<Duration>,
        set: Option<&'a ChannelSet<T>>,
        cancel: CancelToken,
    ) -> CspResult<ReadAnyFuture<'a, T>> {
        read_from_any_future_impl(channels, priority, deadline, set, Some(cancel))
    }

    fn read_from_any_future_impl<'a, T: Send + 'static>(
        channels: &'a [Channel<T>],
        priority: Priority,
        deadline: Option<Duration>,
        set: Option<&'a ChannelSet<T>>,
        cancel: Option<CancelToken>,
    ) -> CspResult<ReadAnyFuture<'a, T>> {
        if channels.is_empty() {
            return Err(CspError::InvalidOperation("read_from_any: empty channel list"));
        }
        let cursor = match (priority, set) {
            (Priority::Fair, None) => {
                return Err(CspError::InvalidOperation(
                    "Priority::Fair requires an explicit ChannelSet",
                ));
            }
            (Priority::Fair, Some(set)) => set.cursor(),
            _ => 0,
        };

        let offer: Arc<ChannelOffer> = Arc::new(Offer::new());
        let order = posting_order(channels.len(), priority, cursor);
        let mut posted = Vec::with_capacity(channels.len());
        for &index in &order {
            channels[index].post_read(offer.clone());
            posted.push(index);
            if !offer.is_probing() {
                break;
            }
        }
        if let Some(at) = deadline.map(|d| Instant::now() + d) {
            spawn_deadline(offer.clone(), at);
        }
        if let Some(token) = cancel {
            spawn_cancel_watch(offer.clone(), token);
        }
        offer.mark_probe_complete();

        Ok(ReadAnyFuture {
            channels,
            set,
            offer,
            posted,
            done: false,
        })
    }

    #[must_use = "futures do nothing unless polled"]
    pub struct WriteAnyFuture<'a, T> {
        channels: &'a [Channel<T>],
        set: Option<&'a ChannelSet<T>>,
        offer: Arc<ChannelOffer>,
        posted: Vec<usize>,
        done: bool,
    }

    impl<T> Unpin for WriteAnyFuture<'_, T> {}

    impl<T: Send + 'static> Future for WriteAnyFuture<'_, T> {
        type Output = CspResult<usize>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            match self.offer.completer().poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(result) => {
                    self.done = true;
                    Poll::Ready(result.map(|(winner, _)| {
                        let index = find_index(self.channels, winner);
                        if let Some(set) = self.set {
                            set.advance_cursor(index, self.channels.len());
                        }
                        index
                    }))
                }
            }
        }
    }

    impl<T> Drop for WriteAnyFuture<'_, T> {
        fn drop(&mut self) {
            if !self.done {
                for &index in &self.posted {
                    self.channels[index].purge_write(&self.offer);
                }
            }
        }
    }

    /// Posts `values`/`channels` (paired positionally) in `priority` order
    /// and returns a future resolving to the winning index — the async
    /// counterpart to [`write_to_any`](super::write_to_any).
    pub fn write_to_any_future<'a, T: Send + 'static>(
        channels: &'a [Channel<T>],
        values: Vec<T>,
        priority: Priority,
        deadline: Option<Duration>,
        set: Option<&'a ChannelSet<T>>,
    ) -> CspResult<WriteAnyFuture<'a, T>> {
        write_to_any_future_impl(channels, values, priority, deadline, set, None)
    }

    /// Same as [`write_to_any_future`], additionally racing `cancel` against
    /// the deadline and any pairing.
    pub fn write_to_any_future_cancellable<'a, T: Send + 'static>(
        channels: &'a [Channel<T>],
        values: Vec<T>,
        priority: Priority,
        deadline: Option<Duration>,
        set: Option<&'a ChannelSet<T>>,
        cancel: CancelToken,
    ) -> CspResult<WriteAnyFuture<'a, T>> {
        write_to_any_future_impl(channels, values, priority, deadline, set, Some(cancel))
    }

    fn write_to_any_future_impl<'a, T: Send + 'static>(
        channels: &'a [Channel<T>],
        mut values: Vec<T>,
        priority: Priority,
        deadline: Option<Duration>,
        set: Option<&'a ChannelSet<T>>,
        cancel: Option<CancelToken>,
    ) -> CspResult<WriteAnyFuture<'a, T>> {
        if channels.is_empty() || channels.len() != values.len() {
            return Err(CspError::InvalidOperation(
                "write_to_any: channel and value lists must be equal length and non-empty",
            ));
        }
        let cursor = match (priority, set) {
            (Priority::Fair, None) => {
                return Err(CspError::InvalidOperation(
                    "Priority::Fair requires an explicit ChannelSet",
                ));
            }
            (Priority::Fair, Some(set)) => set.cursor(),
            _ => 0,
        };

        let offer: Arc<ChannelOffer> = Arc::new(Offer::new());
        let order = posting_order(channels.len(), priority, cursor);
        let mut slots: Vec<Option<T>> = values.drain(..).map(Some).collect();
        let mut posted = Vec::with_capacity(channels.len());
        for &index in &order {
            let value = slots[index].take().expect("each index posted at most once");
            channels[index].post_write(value, offer.clone());
            posted.push(index);
            if !offer.is_probing() {
                break;
            }
        }
        if let Some(at) = deadline.map(|d| Instant::now() + d) {
            spawn_deadline(offer.clone(), at);
        }
        if let Some(token) = cancel {
            spawn_cancel_watch(offer.clone(), token);
        }
        offer.mark_probe_complete();

        Ok(WriteAnyFuture {
            channels,
            set,
            offer,
            posted,
            done: false,
        })
    }

    /// The heterogeneous counterpart: owns its posted candidates' purge
    /// closures rather than borrowing a channel slice, since
    /// [`read_or_write_any`](super::read_or_write_any)'s candidates can
    /// belong to channels of different payload types with no common slice
    /// to hold a lifetime against.
    #[must_use = "futures do nothing unless polled"]
    pub struct ReadOrWriteAnyFuture {
        channel_ids: Vec<u64>,
        offer: Arc<ChannelOffer>,
        purges: Option<Vec<Box<dyn FnOnce() + Send>>>,
        done: bool,
    }

    impl Unpin for ReadOrWriteAnyFuture {}

    impl Future for ReadOrWriteAnyFuture {
        type Output = CspResult<crate::request::AnyOutcome>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            use crate::request::AnyOutcome;
            match self.offer.completer().poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(result) => {
                    self.done = true;
                    Poll::Ready(result.map(|(winner, value)| {
                        let index = self
                            .channel_ids
                            .iter()
                            .position(|&id| id == winner)
                            .expect("committed channel id must be one of the posted candidates");
                        match value {
                            AltValue::Read(boxed) => AnyOutcome::Read {
                                index,
                                channel: winner,
                                value: boxed,
                            },
                            AltValue::Write => AnyOutcome::Write {
                                index,
                                channel: winner,
                            },
                        }
                    }))
                }
            }
        }
    }

    impl Drop for ReadOrWriteAnyFuture {
        fn drop(&mut self) {
            if !self.done {
                if let Some(purges) = self.purges.take() {
                    for purge in purges {
                        purge();
                    }
                }
            }
        }
    }

    /// Posts a mix of read/write `candidates` in `priority` order and
    /// returns a future resolving to the winning [`AnyOutcome`](crate::request::AnyOutcome)
    /// — the async counterpart to [`read_or_write_any`](super::read_or_write_any).
    pub fn read_or_write_any_future(
        candidates: Vec<Box<dyn Candidate>>,
        priority: Priority,
        deadline: Option<Duration>,
    ) -> CspResult<ReadOrWriteAnyFuture> {
        read_or_write_any_future_impl(candidates, priority, deadline, None)
    }

    /// Same as [`read_or_write_any_future`], additionally racing `cancel`
    /// against the deadline and any pairing.
    pub fn read_or_write_any_future_cancellable(
        candidates: Vec<Box<dyn Candidate>>,
        priority: Priority,
        deadline: Option<Duration>,
        cancel: CancelToken,
    ) -> CspResult<ReadOrWriteAnyFuture> {
        read_or_write_any_future_impl(candidates, priority, deadline, Some(cancel))
    }

    fn read_or_write_any_future_impl(
        candidates: Vec<Box<dyn Candidate>>,
        priority: Priority,
        deadline: Option<Duration>,
        cancel: Option<CancelToken>,
    ) -> CspResult<ReadOrWriteAnyFuture> {
        if candidates.is_empty() {
            return Err(CspError::InvalidOperation(
                "read_or_write_any: empty candidate list",
            ));
        }
        if priority == Priority::Fair {
            return Err(CspError::InvalidOperation(
                "Priority::Fair requires an explicit ChannelSet",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for candidate in &candidates {
            if !seen.insert(candidate.channel_id()) {
                return Err(CspError::InvalidOperation(
                    "read_or_write_any: the same channel cannot appear twice in one alt",
                ));
            }
        }

        let offer: Arc<ChannelOffer> = Arc::new(Offer::new());
        let order = posting_order(candidates.len(), priority, 0);
        let channel_ids: Vec<u64> = candidates.iter().map(|c| c.channel_id()).collect();
        let mut slots: Vec<Option<Box<dyn Candidate>>> = candidates.into_iter().map(Some).collect();
        let mut purges: Vec<Box<dyn FnOnce() + Send>> = Vec::with_capacity(channel_ids.len());
        for &index in &order {
            let candidate = slots[index].take().expect("each index posted at most once");
            purges.push(candidate.post(offer.clone()));
            if !offer.is_probing() {
                break;
            }
        }
        if let Some(at) = deadline.map(|d| Instant::now() + d) {
            spawn_deadline(offer.clone(), at);
        }
        if let Some(token) = cancel {
            spawn_cancel_watch(offer.clone(), token);
        }
        offer.mark_probe_complete();

        Ok(ReadOrWriteAnyFuture {
            channel_ids,
            offer,
            purges: Some(purges),
            done: false,
        })
    }
}
