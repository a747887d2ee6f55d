//! Typed channels: rendezvous, buffering, and retirement (spec.md §2, §4.2).
//!
//! A [`Channel<T>`] is a cheap, `Clone`-able handle (an `Arc` around the
//! shared queues) over one rendezvous/buffered link. All of the pairing
//! logic lives in [`state`]; this module owns the public surface: options,
//! status, the blocking and async read/write entry points, and retirement.
mod state;

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{CspError, CspResult};
use crate::offer::{ChannelId, Offer};
use crate::request::{AltValue, ChannelOffer};
use crate::timer::{CancelToken, spawn_cancel_watch, spawn_deadline};

use state::{ChannelState, Withdrawals, enqueue_reader, enqueue_writer, matchmake};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// What happens to a pending request when its side of a channel is full.
/// Only applies to requests that are not immediately pairable on arrival —
/// see spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// The newly arriving request is failed with [`CspError::OverflowRejected`].
    Reject,
    /// The most recently queued request is evicted to make room for the new one.
    Lifo,
    /// The oldest queued request is evicted to make room for the new one.
    FifoDropHead,
}

/// Lifecycle state of a channel, per spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Open,
    /// Draining: no new requests are accepted, but already-pending ones may
    /// still pair while anything resolvable remains.
    Retiring,
    /// Terminal: every pending and future request fails with [`CspError::Retired`].
    Retired,
}

/// Builder for a [`Channel`]'s fixed configuration.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    capacity: usize,
    reader_cap: Option<usize>,
    writer_cap: Option<usize>,
    reader_overflow: OverflowPolicy,
    writer_overflow: OverflowPolicy,
    name: Option<String>,
}

impl Default for ChannelOptions {
    /// A bare rendezvous channel (no buffer, unbounded pending queues,
    /// overflow policy irrelevant without a cap) — spec.md §2's default.
    fn default() -> Self {
        Self {
            capacity: 0,
            reader_cap: None,
            writer_cap: None,
            reader_overflow: OverflowPolicy::Reject,
            writer_overflow: OverflowPolicy::Reject,
            name: None,
        }
    }
}

impl ChannelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer capacity: `0` is a pure rendezvous channel.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn reader_cap(mut self, cap: usize) -> Self {
        self.reader_cap = Some(cap);
        self
    }

    pub fn writer_cap(mut self, cap: usize) -> Self {
        self.writer_cap = Some(cap);
        self
    }

    pub fn reader_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.reader_overflow = policy;
        self
    }

    pub fn writer_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.writer_overflow = policy;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build<T: Send + 'static>(self) -> Channel<T> {
        Channel::with_options(self)
    }
}

/// A point-in-time snapshot of a channel's queue depths and configuration,
/// for introspection/monitoring (spec.md §6).
#[derive(Debug, Clone)]
pub struct ChannelProbe {
    pub id: ChannelId,
    pub name: Option<String>,
    pub status: ChannelStatus,
    pub buffered: usize,
    pub pending_readers: usize,
    pub pending_writers: usize,
    pub capacity: usize,
}

/// Type-erased view of a channel for registry/scope bookkeeping, where the
/// payload type `T` is not known statically (spec.md §7).
pub trait AnyChannel: Send + Sync {
    fn id(&self) -> ChannelId;
    fn name(&self) -> Option<String>;
    fn retire(&self, immediate: bool);
    fn probe(&self) -> ChannelProbe;
    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

struct Inner<T> {
    id: ChannelId,
    name: Option<String>,
    capacity: usize,
    reader_cap: Option<usize>,
    writer_cap: Option<usize>,
    reader_overflow: OverflowPolicy,
    writer_overflow: OverflowPolicy,
    state: Mutex<ChannelState<T>>,
}

/// A typed, cloneable handle to a rendezvous/buffered channel.
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    pub fn new() -> Self {
        Self::with_options(ChannelOptions::default())
    }

    pub fn with_options(options: ChannelOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
                name: options.name,
                capacity: options.capacity,
                reader_cap: options.reader_cap,
                writer_cap: options.writer_cap,
                reader_overflow: options.reader_overflow,
                writer_overflow: options.writer_overflow,
                state: Mutex::new(ChannelState::new()),
            }),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }

    /// Posts a read request against this channel, sharing `offer` with
    /// whatever other candidates (if any) the same alt has already posted.
    /// Runs the matchmake pass and fires any resulting commits/withdrawals
    /// once the lock is released, per spec.md §5.
    pub(crate) fn post_read(&self, offer: Arc<ChannelOffer>) {
        let mut withdrawals = Withdrawals::new();
        let commits = {
            let mut state = self.inner.state.lock().unwrap();
            // Retiring refuses *new* requests too (spec.md §4.2: "While
            // Retiring the channel refuses new requests with Retired,
            // drains its buffer to already-queued readers"); only requests
            // already enqueued before retirement began may still pair.
            if state.status != ChannelStatus::Open {
                withdrawals.push((offer, CspError::Retired));
                return self.fire(Vec::new(), withdrawals);
            }
            enqueue_reader(
                &mut state,
                offer,
                self.inner.reader_cap,
                self.inner.reader_overflow,
                &mut withdrawals,
            );
            matchmake(&mut state, self.inner.capacity)
        };
        self.fire(commits, withdrawals);
    }

    pub(crate) fn post_write(&self, value: T, offer: Arc<ChannelOffer>) {
        let mut withdrawals = Withdrawals::new();
        let commits = {
            let mut state = self.inner.state.lock().unwrap();
            // See post_read: Retiring refuses new requests too.
            if state.status != ChannelStatus::Open {
                withdrawals.push((offer, CspError::Retired));
                return self.fire(Vec::new(), withdrawals);
            }
            enqueue_writer(
                &mut state,
                offer,
                value,
                self.inner.capacity,
                self.inner.writer_cap,
                self.inner.writer_overflow,
                &mut withdrawals,
            );
            matchmake(&mut state, self.inner.capacity)
        };
        self.fire(commits, withdrawals);
    }

    fn fire(&self, commits: Vec<state::CommitJob<T>>, withdrawals: Withdrawals) {
        let id = self.inner.id;
        for job in commits {
            job.fire(id);
        }
        for (offer, reason) in withdrawals {
            offer.withdraw(reason);
        }
    }

    /// Removes a pending read entry referencing `offer`, if one is still
    /// queued. Called once an Offer resolves by some means other than this
    /// channel pairing it (a timeout, a cancellation, or a sibling
    /// candidate winning), so a resolved alt never leaves a stale entry
    /// behind (spec.md §8 scenario 2).
    pub(crate) fn purge_read(&self, offer: &Arc<ChannelOffer>) {
        let mut state = self.inner.state.lock().unwrap();
        state.readers.retain(|r| !Arc::ptr_eq(&r.offer, offer));
    }

    pub(crate) fn purge_write(&self, offer: &Arc<ChannelOffer>) {
        let mut state = self.inner.state.lock().unwrap();
        state.writers.retain(|w| !Arc::ptr_eq(&w.offer, offer));
    }

    /// Posts a read request with an optional deadline and blocks the
    /// calling thread for the result.
    pub fn read(&self, deadline: Option<Duration>) -> CspResult<T> {
        self.read_impl(deadline, None)
    }

    /// Same as [`Channel::read`], additionally racing `cancel` against the
    /// deadline and any pairing, per spec.md §4.4: "the library does not
    /// require [a cancellation signal] but must honour it if supplied."
    pub fn read_cancellable(&self, deadline: Option<Duration>, cancel: CancelToken) -> CspResult<T> {
        self.read_impl(deadline, Some(cancel))
    }

    fn read_impl(&self, deadline: Option<Duration>, cancel: Option<CancelToken>) -> CspResult<T> {
        let offer = Arc::new(Offer::trivial());
        self.post_read(offer.clone());
        let deadline_at = deadline.map(|d| Instant::now() + d);
        if let Some(at) = deadline_at {
            spawn_deadline(offer.clone(), at);
        }
        if let Some(token) = cancel {
            spawn_cancel_watch(offer.clone(), token);
        }
        let result = offer.completer().wait(deadline_at);
        if result.is_err() {
            self.purge_read(&offer);
        }
        let (_, value) = result?;
        match value {
            AltValue::Read(boxed) => Ok(*boxed
                .downcast::<T>()
                .unwrap_or_else(|_| panic!("Channel::read: type mismatch on commit"))),
            AltValue::Write => unreachable!("a read request can only commit to a Read value"),
        }
    }

    /// Posts a write request with an optional deadline and blocks the
    /// calling thread until it is accepted.
    pub fn write(&self, value: T, deadline: Option<Duration>) -> CspResult<()> {
        self.write_impl(value, deadline, None)
    }

    /// Same as [`Channel::write`], additionally racing `cancel` against the
    /// deadline and any pairing.
    pub fn write_cancellable(
        &self,
        value: T,
        deadline: Option<Duration>,
        cancel: CancelToken,
    ) -> CspResult<()> {
        self.write_impl(value, deadline, Some(cancel))
    }

    fn write_impl(
        &self,
        value: T,
        deadline: Option<Duration>,
        cancel: Option<CancelToken>,
    ) -> CspResult<()> {
        let offer = Arc::new(Offer::trivial());
        self.post_write(value, offer.clone());
        let deadline_at = deadline.map(|d| Instant::now() + d);
        if let Some(at) = deadline_at {
            spawn_deadline(offer.clone(), at);
        }
        if let Some(token) = cancel {
            spawn_cancel_watch(offer.clone(), token);
        }
        let result = offer.completer().wait(deadline_at);
        if result.is_err() {
            self.purge_write(&offer);
        }
        result?;
        Ok(())
    }

    /// Posts a read request and returns a [`Future`](std::future::Future)
    /// that resolves once it pairs, times out, or is cancelled — the async
    /// counterpart to [`Channel::read`]. Dropping the returned future before
    /// it resolves purges the still-pending entry from this channel's queue,
    /// the same cleanup [`Channel::read`] does on a `Timeout`/`Cancelled`
    /// error.
    #[cfg(feature = "async")]
    pub fn read_future(&self, deadline: Option<Duration>) -> ReadFuture<T> {
        self.read_future_impl(deadline, None)
    }

    /// Same as [`Channel::read_future`], additionally racing `cancel`
    /// against the deadline and any pairing.
    #[cfg(feature = "async")]
    pub fn read_future_cancellable(&self, deadline: Option<Duration>, cancel: CancelToken) -> ReadFuture<T> {
        self.read_future_impl(deadline, Some(cancel))
    }

    #[cfg(feature = "async")]
    fn read_future_impl(&self, deadline: Option<Duration>, cancel: Option<CancelToken>) -> ReadFuture<T> {
        let offer = Arc::new(Offer::trivial());
        self.post_read(offer.clone());
        if let Some(at) = deadline.map(|d| Instant::now() + d) {
            spawn_deadline(offer.clone(), at);
        }
        if let Some(token) = cancel {
            spawn_cancel_watch(offer.clone(), token);
        }
        ReadFuture {
            channel: self.clone(),
            offer: Some(offer),
            done: false,
        }
    }

    /// Posts a write request and returns a [`Future`](std::future::Future)
    /// that resolves once it pairs, times out, or is cancelled — the async
    /// counterpart to [`Channel::write`].
    #[cfg(feature = "async")]
    pub fn write_future(&self, value: T, deadline: Option<Duration>) -> WriteFuture<T> {
        self.write_future_impl(value, deadline, None)
    }

    /// Same as [`Channel::write_future`], additionally racing `cancel`
    /// against the deadline and any pairing.
    #[cfg(feature = "async")]
    pub fn write_future_cancellable(
        &self,
        value: T,
        deadline: Option<Duration>,
        cancel: CancelToken,
    ) -> WriteFuture<T> {
        self.write_future_impl(value, deadline, Some(cancel))
    }

    #[cfg(feature = "async")]
    fn write_future_impl(
        &self,
        value: T,
        deadline: Option<Duration>,
        cancel: Option<CancelToken>,
    ) -> WriteFuture<T> {
        let offer = Arc::new(Offer::trivial());
        self.post_write(value, offer.clone());
        if let Some(at) = deadline.map(|d| Instant::now() + d) {
            spawn_deadline(offer.clone(), at);
        }
        if let Some(token) = cancel {
            spawn_cancel_watch(offer.clone(), token);
        }
        WriteFuture {
            channel: self.clone(),
            offer: Some(offer),
            done: false,
        }
    }

    /// Begins graceful (`immediate = false`) or immediate retirement.
    /// Graceful retirement lets already-pending, currently resolvable
    /// pairings go through; immediate retirement fails everything pending
    /// synchronously (spec.md §4.5).
    pub fn retire(&self, immediate: bool) {
        let mut withdrawals = Withdrawals::new();
        let commits = {
            let mut state = self.inner.state.lock().unwrap();
            if state.status == ChannelStatus::Retired {
                return;
            }
            if immediate {
                for reader in state.readers.drain(..) {
                    withdrawals.push((reader.offer, CspError::Retired));
                }
                for writer in state.writers.drain(..) {
                    withdrawals.push((writer.offer, CspError::Retired));
                }
                state.buffer.clear();
                state.status = ChannelStatus::Retired;
                Vec::new()
            } else {
                state.status = ChannelStatus::Retiring;
                matchmake(&mut state, self.inner.capacity)
            }
        };
        self.fire(commits, withdrawals);
    }

    pub fn probe(&self) -> ChannelProbe {
        let state = self.inner.state.lock().unwrap();
        ChannelProbe {
            id: self.inner.id,
            name: self.inner.name.clone(),
            status: state.status,
            buffered: state.buffer.len(),
            pending_readers: state.readers.len(),
            pending_writers: state.writers.len(),
            capacity: self.inner.capacity,
        }
    }
}

impl<T: Send + 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> AnyChannel for Channel<T> {
    fn id(&self) -> ChannelId {
        self.id()
    }

    fn name(&self) -> Option<String> {
        self.name()
    }

    fn retire(&self, immediate: bool) {
        Channel::retire(self, immediate)
    }

    fn probe(&self) -> ChannelProbe {
        Channel::probe(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(feature = "async")]
pub use r#async::{ReadFuture, WriteFuture};

/// The async counterparts of [`Channel::read`]/[`Channel::write`], built
/// directly on [`Completer::poll`](crate::completer::Completer::poll)
/// rather than borrowing a [`CompleterFuture`](crate::completer::CompleterFuture),
/// since each owns the `Arc<Offer<_>>` it posted instead of borrowing one
/// tied to a stack frame. Mirrors the teacher's `SendFuture`/`RecvFuture`:
/// `#[must_use]`, `Unpin` (no self-referential state), purge-on-drop for
/// cancel safety.
#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    #[must_use = "futures do nothing unless polled"]
    pub struct ReadFuture<T> {
        pub(super) channel: Channel<T>,
        pub(super) offer: Option<Arc<ChannelOffer>>,
        pub(super) done: bool,
    }

    impl<T> Unpin for ReadFuture<T> {}

    impl<T: Send + 'static> Future for ReadFuture<T> {
        type Output = CspResult<T>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            let offer = self.offer.as_ref().expect("ReadFuture polled after completion");
            match offer.completer().poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(result) => {
                    self.done = true;
                    Poll::Ready(result.map(|(_, value)| match value {
                        AltValue::Read(boxed) => *boxed
                            .downcast::<T>()
                            .unwrap_or_else(|_| panic!("ReadFuture: type mismatch on commit")),
                        AltValue::Write => unreachable!("a read request can only commit to a Read value"),
                    }))
                }
            }
        }
    }

    impl<T> Drop for ReadFuture<T> {
        fn drop(&mut self) {
            if let Some(offer) = self.offer.take() {
                if !self.done {
                    self.channel.purge_read(&offer);
                }
            }
        }
    }

    #[must_use = "futures do nothing unless polled"]
    pub struct WriteFuture<T> {
        pub(super) channel: Channel<T>,
        pub(super) offer: Option<Arc<ChannelOffer>>,
        pub(super) done: bool,
    }

    impl<T> Unpin for WriteFuture<T> {}

    impl<T: Send + 'static> Future for WriteFuture<T> {
        type Output = CspResult<()>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            let offer = self.offer.as_ref().expect("WriteFuture polled after completion");
            match offer.completer().poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(result) => {
                    self.done = true;
                    Poll::Ready(result.map(|_| ()))
                }
            }
        }
    }

    impl<T> Drop for WriteFuture<T> {
        fn drop(&mut self) {
            if let Some(offer) = self.offer.take() {
                if !self.done {
                    self.channel.purge_write(&offer);
                }
            }
        }
    }
}
