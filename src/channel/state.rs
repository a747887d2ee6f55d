//! The three FIFO queues behind one [`Channel`](super::Channel) and the
//! matchmake algorithm of spec.md §4.2.
use std::collections::VecDeque;
use std::sync::Arc;

use crate::channel::{ChannelStatus, OverflowPolicy};
use crate::error::CspError;
use crate::offer::{ChannelId, Decision};
use crate::request::{AltValue, ChannelOffer};

pub(crate) struct PendingReader {
    pub(crate) offer: Arc<ChannelOffer>,
}

pub(crate) struct PendingWriter<T> {
    pub(crate) offer: Arc<ChannelOffer>,
    pub(crate) value: T,
}

pub(crate) struct ChannelState<T> {
    pub(crate) buffer: VecDeque<T>,
    pub(crate) readers: VecDeque<PendingReader>,
    pub(crate) writers: VecDeque<PendingWriter<T>>,
    pub(crate) status: ChannelStatus,
}

impl<T> ChannelState<T> {
    pub(crate) fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            readers: VecDeque::new(),
            writers: VecDeque::new(),
            status: ChannelStatus::Open,
        }
    }
}

/// A pairing `matchmake()` has decided on, deferred so the caller can fire
/// it — running the commit callback and waking the winning completer —
/// only after the channel's mutex has been released (spec.md §5: "Never
/// call user code while holding the channel lock").
pub(crate) enum CommitJob<T> {
    ReaderWriter {
        reader: Arc<ChannelOffer>,
        writer: Arc<ChannelOffer>,
        value: T,
    },
    ReaderBuffer {
        reader: Arc<ChannelOffer>,
        value: T,
    },
    WriterBuffer {
        writer: Arc<ChannelOffer>,
    },
}

impl<T> CommitJob<T> {
    pub(crate) fn fire(self, id: ChannelId) {
        match self {
            CommitJob::ReaderWriter {
                reader,
                writer,
                value,
            } => {
                reader.commit(id, AltValue::Read(Box::new(value)));
                writer.commit(id, AltValue::Write);
            }
            CommitJob::ReaderBuffer { reader, value } => {
                reader.commit(id, AltValue::Read(Box::new(value)));
            }
            CommitJob::WriterBuffer { writer } => {
                writer.commit(id, AltValue::Write);
            }
        }
    }
}

/// Offers that must be failed outside the lock: an overflow eviction, or a
/// brand-new request arriving at a channel that is no longer `Open`.
pub(crate) type Withdrawals = Vec<(Arc<ChannelOffer>, CspError)>;

/// Enqueues a new reader, applying the reader-overflow policy if the
/// pending-reader queue is at capacity *and* the new reader has no
/// opportunity to pair immediately (the fast path of spec.md §4.2: "a Read
/// arriving at a channel whose buffer is non-empty or whose write queue is
/// non-empty attempts immediate pairing before enqueuing" — and a request
/// that will pair immediately was never really "pending", so the cap does
/// not apply to it).
pub(crate) fn enqueue_reader<T>(
    state: &mut ChannelState<T>,
    offer: Arc<ChannelOffer>,
    reader_cap: Option<usize>,
    policy: OverflowPolicy,
    withdrawals: &mut Withdrawals,
) {
    let immediately_pairable =
        state.readers.is_empty() && (!state.buffer.is_empty() || !state.writers.is_empty());
    if !immediately_pairable {
        if let Some(cap) = reader_cap {
            if state.readers.len() >= cap {
                if policy == OverflowPolicy::Reject {
                    withdrawals.push((offer, CspError::OverflowRejected));
                    return;
                }
                apply_overflow(&mut state.readers, policy, withdrawals);
            }
        }
    }
    state.readers.push_back(PendingReader { offer });
}

pub(crate) fn enqueue_writer<T>(
    state: &mut ChannelState<T>,
    offer: Arc<ChannelOffer>,
    value: T,
    capacity: usize,
    writer_cap: Option<usize>,
    policy: OverflowPolicy,
    withdrawals: &mut Withdrawals,
) {
    let immediately_pairable =
        state.writers.is_empty() && (!state.readers.is_empty() || state.buffer.len() < capacity);
    if !immediately_pairable {
        if let Some(cap) = writer_cap {
            if state.writers.len() >= cap {
                if policy == OverflowPolicy::Reject {
                    withdrawals.push((offer, CspError::OverflowRejected));
                    return;
                }
                apply_overflow(&mut state.writers, policy, withdrawals);
            }
        }
    }
    state.writers.push_back(PendingWriter { offer, value });
}

/// Evicts one already-queued entry to make room, per `policy` (never called
/// for [`OverflowPolicy::Reject`], which rejects the incoming request
/// instead — see the call sites above).
fn apply_overflow<E: HasOffer>(
    queue: &mut VecDeque<E>,
    policy: OverflowPolicy,
    withdrawals: &mut Withdrawals,
) {
    match policy {
        OverflowPolicy::Reject => unreachable!("Reject is handled by the caller before queueing"),
        OverflowPolicy::Lifo => {
            if let Some(evicted) = queue.pop_back() {
                withdrawals.push((evicted.offer(), CspError::OverflowRejected));
            }
        }
        OverflowPolicy::FifoDropHead => {
            if let Some(evicted) = queue.pop_front() {
                withdrawals.push((evicted.offer(), CspError::OverflowRejected));
            }
        }
    }
}

trait HasOffer {
    fn offer(self) -> Arc<ChannelOffer>;
}

impl HasOffer for PendingReader {
    fn offer(self) -> Arc<ChannelOffer> {
        self.offer
    }
}

impl<T> HasOffer for PendingWriter<T> {
    fn offer(self) -> Arc<ChannelOffer> {
        self.offer
    }
}

/// Runs to completion without suspension, matching pending readers,
/// pending writers, and the buffer, per spec.md §4.2's pairing algorithm
/// and §5's "no await while holding the channel's critical section".
pub(crate) fn matchmake<T>(state: &mut ChannelState<T>, capacity: usize) -> Vec<CommitJob<T>> {
    let mut commits = Vec::new();
    loop {
        if !state.buffer.is_empty() && !state.readers.is_empty() {
            match state.readers.front().unwrap().offer.try_reserve() {
                Decision::Accept => {
                    let reader = state.readers.pop_front().unwrap();
                    let value = state.buffer.pop_front().unwrap();
                    commits.push(CommitJob::ReaderBuffer {
                        reader: reader.offer,
                        value,
                    });
                    continue;
                }
                Decision::Decline => {
                    state.readers.pop_front();
                    continue;
                }
                // The front reader's Offer is still Probing but reserved by
                // a concurrent candidate pairing elsewhere (e.g. this same
                // reader posted on a different channel in one alt). Leave it
                // queued — it may still be winnable once that pairing
                // resolves — and stop matchmaking for now rather than drop
                // it or spin.
                Decision::Busy => break,
            }
        }

        if !state.readers.is_empty() && !state.writers.is_empty() {
            match state.readers.front().unwrap().offer.try_reserve() {
                Decision::Decline => {
                    state.readers.pop_front();
                    continue;
                }
                Decision::Busy => break,
                Decision::Accept => match state.writers.front().unwrap().offer.try_reserve() {
                    Decision::Decline => {
                        state.readers.front().unwrap().offer.release();
                        state.writers.pop_front();
                        continue;
                    }
                    // The writer is merely contended, not resolved: give
                    // back the reader's reservation (both queue entries stay
                    // put) and stop, rather than discarding the writer.
                    Decision::Busy => {
                        state.readers.front().unwrap().offer.release();
                        break;
                    }
                    Decision::Accept => {
                        let reader = state.readers.pop_front().unwrap();
                        let writer = state.writers.pop_front().unwrap();
                        commits.push(CommitJob::ReaderWriter {
                            reader: reader.offer,
                            writer: writer.offer,
                            value: writer.value,
                        });
                        continue;
                    }
                },
            }
        }

        if !state.writers.is_empty() && state.buffer.len() < capacity {
            match state.writers.front().unwrap().offer.try_reserve() {
                Decision::Accept => {
                    let writer = state.writers.pop_front().unwrap();
                    state.buffer.push_back(writer.value);
                    commits.push(CommitJob::WriterBuffer {
                        writer: writer.offer,
                    });
                    continue;
                }
                Decision::Decline => {
                    state.writers.pop_front();
                    continue;
                }
                Decision::Busy => break,
            }
        }

        break;
    }

    if state.status == ChannelStatus::Retiring
        && state.readers.is_empty()
        && state.writers.is_empty()
        && state.buffer.is_empty()
    {
        state.status = ChannelStatus::Retired;
    }

    commits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::Offer;

    #[test]
    fn writer_fills_buffer_then_reader_drains_it() {
        let mut state: ChannelState<i32> = ChannelState::new();
        let mut withdrawals = Withdrawals::new();

        let writer_offer = Arc::new(Offer::trivial());
        enqueue_writer(
            &mut state,
            writer_offer.clone(),
            7,
            1,
            None,
            OverflowPolicy::Reject,
            &mut withdrawals,
        );
        let commits = matchmake(&mut state, 1);
        assert!(withdrawals.is_empty());
        assert_eq!(commits.len(), 1);
        for job in commits {
            job.fire(1);
        }
        assert_eq!(writer_offer.state(), crate::offer::OfferState::Committed);
        assert_eq!(state.buffer.len(), 1);

        let reader_offer = Arc::new(Offer::trivial());
        enqueue_reader(&mut state, reader_offer.clone(), None, OverflowPolicy::Reject, &mut withdrawals);
        let commits = matchmake(&mut state, 1);
        assert_eq!(commits.len(), 1);
        for job in commits {
            job.fire(1);
        }
        assert_eq!(reader_offer.state(), crate::offer::OfferState::Committed);
        assert!(state.buffer.is_empty());
    }

    #[test]
    fn overflow_reject_does_not_touch_queue() {
        let mut state: ChannelState<i32> = ChannelState::new();
        let mut withdrawals = Withdrawals::new();
        let o1 = Arc::new(Offer::trivial());
        enqueue_reader(&mut state, o1.clone(), Some(1), OverflowPolicy::Reject, &mut withdrawals);
        assert_eq!(state.readers.len(), 1);
        assert!(withdrawals.is_empty());
    }

    #[test]
    fn busy_offer_stays_queued_instead_of_being_dropped() {
        // Simulates a reader whose Offer is shared with another channel in
        // the same alt: that other channel's matchmake pass is mid-way
        // through a candidate pairing and currently holds the reservation,
        // even though the Offer is still Probing.
        let mut state: ChannelState<i32> = ChannelState::new();
        let mut withdrawals = Withdrawals::new();

        let writer_offer = Arc::new(Offer::trivial());
        enqueue_writer(
            &mut state,
            writer_offer.clone(),
            9,
            1,
            None,
            OverflowPolicy::Reject,
            &mut withdrawals,
        );
        for job in matchmake(&mut state, 1) {
            job.fire(1);
        }
        assert_eq!(state.buffer.len(), 1);

        let reader_offer = Arc::new(Offer::trivial());
        assert_eq!(reader_offer.try_reserve(), crate::offer::Decision::Accept); // external hold
        enqueue_reader(&mut state, reader_offer.clone(), None, OverflowPolicy::Reject, &mut withdrawals);

        let commits = matchmake(&mut state, 1);
        assert!(commits.is_empty());
        assert_eq!(state.readers.len(), 1, "a Busy offer must stay queued, not be dropped");
        assert_eq!(state.buffer.len(), 1, "the buffered value must not be consumed on Busy");
        assert_eq!(reader_offer.state(), crate::offer::OfferState::Probing);

        // Once the external hold releases, the very next matchmake pass
        // pairs the still-queued reader against the buffered value.
        reader_offer.release();
        let commits = matchmake(&mut state, 1);
        assert_eq!(commits.len(), 1);
        for job in commits {
            job.fire(1);
        }
        assert_eq!(reader_offer.state(), crate::offer::OfferState::Committed);
        assert!(state.buffer.is_empty());
    }

    #[test]
    fn busy_writer_releases_accepted_reader_reservation() {
        // Readers+writers branch: the reader reserves fine, but the writer
        // is contended elsewhere (still Probing). The reader's reservation
        // must be given back, not committed or dropped.
        let mut state: ChannelState<i32> = ChannelState::new();
        let mut withdrawals = Withdrawals::new();

        let reader_offer = Arc::new(Offer::trivial());
        enqueue_reader(&mut state, reader_offer.clone(), None, OverflowPolicy::Reject, &mut withdrawals);

        let writer_offer = Arc::new(Offer::trivial());
        assert_eq!(writer_offer.try_reserve(), crate::offer::Decision::Accept); // external hold
        enqueue_writer(
            &mut state,
            writer_offer.clone(),
            5,
            1,
            None,
            OverflowPolicy::Reject,
            &mut withdrawals,
        );

        let commits = matchmake(&mut state, 1);
        assert!(commits.is_empty());
        assert_eq!(state.readers.len(), 1);
        assert_eq!(state.writers.len(), 1);
        assert_eq!(reader_offer.state(), crate::offer::OfferState::Probing);
        assert_eq!(writer_offer.state(), crate::offer::OfferState::Probing);

        writer_offer.release();
        let commits = matchmake(&mut state, 1);
        assert_eq!(commits.len(), 1);
        for job in commits {
            job.fire(1);
        }
        assert_eq!(reader_offer.state(), crate::offer::OfferState::Committed);
        assert_eq!(writer_offer.state(), crate::offer::OfferState::Committed);
    }
}
