//! The Offer Arbiter: the two-phase commit primitive behind every read,
//! write, and alt.
//!
//! Every pending request — even a plain single-channel `read(deadline)` —
//! carries an [`Offer`]. A request posted without an explicit alt gets a
//! throwaway single-slot `Offer` (see [`Offer::trivial`]); a multi-channel
//! alt shares one `Offer` across every request it posts.
//!
//! ## Two layers, one contract
//!
//! spec.md's Offer state machine (`Probing -> Committed`, `Probing ->
//! Withdrawn`, terminal, exactly once) is the *public* contract. Internally
//! it is built from two primitives:
//!
//! - [`Offer::try_reserve`] / [`Offer::release`] — a reversible claim taken
//!   while [`Channel::matchmake`](crate::channel::Channel) is deciding
//!   whether a *candidate* pairing can go through. Reserving runs no user
//!   code and fulfills nothing; `release` simply gives the claim back so a
//!   different candidate pairing (possibly on a different channel) can
//!   still win.
//! - [`Offer::commit`] / [`Offer::withdraw`] — the real, terminal,
//!   exactly-once transition out of `Probing`. `commit` is what runs the
//!   commit callback and is what the winning completer waits on; `withdraw`
//!   is what a deadline or a cancellation signal does.
//!
//! A reservation always resolves (via `commit` or `release`) before
//! `matchmake()` returns, so no externally observable state exists between
//! "reserved" and "committed or released" — callers of the public contract
//! only ever see `Probing`, `Committed`, or `Withdrawn`.
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crossbeam_utils::CachePadded;

use crate::completer::Completer;
use crate::error::CspError;

const PROBING: u8 = 0;
const COMMITTED: u8 = 1;
const WITHDRAWN: u8 = 2;

/// Public lifecycle state of an [`Offer`], per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferState {
    Probing,
    Committed,
    Withdrawn,
}

impl From<u8> for OfferState {
    fn from(v: u8) -> Self {
        match v {
            PROBING => OfferState::Probing,
            COMMITTED => OfferState::Committed,
            _ => OfferState::Withdrawn,
        }
    }
}

/// Outcome of a reservation attempt on one side of a candidate pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// The Offer is resolved (`Committed` or `Withdrawn`) and will never be
    /// `Probing` again: the caller must drop this candidate for good.
    Decline,
    /// The Offer is still `Probing`, but some other candidate pairing (very
    /// likely on a different channel, from the same alt) currently holds the
    /// reservation flag. This is transient: the caller must leave its
    /// request queued and retry on a later `matchmake()` pass rather than
    /// treat this as a permanent decline.
    Busy,
}

/// Identifies which channel (and which side: read or write) won an Offer,
/// so the alt engine can wrap the outcome with the winning channel's
/// identity as spec.md §4.3 requires.
pub type ChannelId = u64;

type CommitCallback = Box<dyn FnOnce() + Send>;

/// A single-use arbiter shared by every request of one alt operation (or,
/// for a plain single-channel call, shared by nobody else: see
/// [`Offer::trivial`]).
pub struct Offer<T> {
    state: CachePadded<AtomicU8>,
    reserved: AtomicBool,
    probe_complete: AtomicBool,
    winner: Mutex<Option<ChannelId>>,
    commit_callback: Mutex<Option<CommitCallback>>,
    completer: Completer<(ChannelId, T)>,
}

impl<T> fmt::Debug for Offer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Offer")
            .field("state", &self.state())
            .field("probe_complete", &self.probe_complete.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> Offer<T> {
    /// Creates a fresh Offer in `Probing` state with no commit callback.
    pub fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU8::new(PROBING)),
            reserved: AtomicBool::new(false),
            probe_complete: AtomicBool::new(false),
            winner: Mutex::new(None),
            commit_callback: Mutex::new(None),
            completer: Completer::new(),
        }
    }

    /// A single-slot Offer for a plain (non-alt) read/write, per spec.md
    /// §4.4: "per-request deadlines ... register one timer per request
    /// against a trivial single-slot Offer."
    pub fn trivial() -> Self {
        Self::new()
    }

    /// Installs the callback run exactly once, synchronously, the moment
    /// this Offer commits — before the winning completer resolves.
    pub fn set_commit_callback(&self, f: impl FnOnce() + Send + 'static) {
        *self.commit_callback.lock().unwrap() = Some(Box::new(f));
    }

    pub fn state(&self) -> OfferState {
        OfferState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_probing(&self) -> bool {
        self.state.load(Ordering::Acquire) == PROBING
    }

    /// Marks that the Alt Engine has finished posting every request for
    /// this Offer. Purely informational/debug bookkeeping: correctness
    /// never depends on it, because any `try_reserve` after a commit simply
    /// observes `Committed` and declines.
    pub fn mark_probe_complete(&self) {
        self.probe_complete.store(true, Ordering::Release);
    }

    pub fn is_probe_complete(&self) -> bool {
        self.probe_complete.load(Ordering::Acquire)
    }

    pub fn winner(&self) -> Option<ChannelId> {
        *self.winner.lock().unwrap()
    }

    /// Attempt to reserve this Offer for one candidate pairing. Returns
    /// [`Decision::Accept`] iff the Offer is `Probing` and no other
    /// candidate pairing currently holds the reservation; the caller must
    /// eventually resolve an accepted reservation with [`Offer::commit`] or
    /// [`Offer::release`]. Returns [`Decision::Busy`] (not `Decline`) when
    /// the Offer is still `Probing` but the reservation flag is currently
    /// held by a different candidate pairing — that pairing may release it
    /// and leave this one still winnable.
    pub fn try_reserve(&self) -> Decision {
        if self.state.load(Ordering::Acquire) != PROBING {
            return Decision::Decline;
        }
        if self
            .reserved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Decision::Busy;
        }
        // Double check: a timer/cancel could have withdrawn us between the
        // first load and winning the reservation flag.
        if self.state.load(Ordering::Acquire) != PROBING {
            self.reserved.store(false, Ordering::Release);
            return Decision::Decline;
        }
        Decision::Accept
    }

    /// Gives back a reservation that did not lead to a commit (the other
    /// side of the candidate pairing declined). Leaves the Offer `Probing`,
    /// unchanged and available to a future candidate pairing.
    pub fn release(&self) {
        self.reserved.store(false, Ordering::Release);
    }

    /// Finalizes a reservation: the terminal, exactly-once `Probing ->
    /// Committed` transition. Runs the commit callback synchronously
    /// (outside any channel lock, per spec.md §5), then fulfills the
    /// completer with `(winner, value)`. Returns `false` (and does nothing)
    /// if this Offer was not `Probing` — double-commit is a defect in the
    /// caller, not a recoverable path, but `commit` stays a safe no-op
    /// rather than panicking so a racing timer can never crash a winner.
    pub fn commit(&self, winner: ChannelId, value: T) -> bool {
        if self
            .state
            .compare_exchange(PROBING, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *self.winner.lock().unwrap() = Some(winner);
        if let Some(cb) = self.commit_callback.lock().unwrap().take() {
            cb();
        }
        self.completer.set_result(Ok((winner, value)));
        true
    }

    /// Withdraws this Offer (timeout, cancellation, or "all candidates
    /// retired"). A no-op if already `Committed` or already `Withdrawn`.
    pub fn withdraw(&self, reason: CspError) -> bool {
        if self
            .state
            .compare_exchange(PROBING, WITHDRAWN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.completer.set_result(Err(reason));
        true
    }

    pub fn completer(&self) -> &Completer<(ChannelId, T)> {
        &self.completer
    }
}

impl<T> Default for Offer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_then_commit_is_exactly_once() {
        let offer: Offer<i32> = Offer::new();
        assert_eq!(offer.try_reserve(), Decision::Accept);
        assert_eq!(offer.try_reserve(), Decision::Busy); // already reserved, still Probing
        assert!(offer.commit(1, 42));
        assert_eq!(offer.state(), OfferState::Committed);
        // A second commit attempt is a no-op, not a panic.
        assert!(!offer.commit(2, 99));
        assert_eq!(offer.winner(), Some(1));
    }

    #[test]
    fn release_makes_offer_reusable() {
        let offer: Offer<i32> = Offer::new();
        assert_eq!(offer.try_reserve(), Decision::Accept);
        offer.release();
        assert_eq!(offer.state(), OfferState::Probing);
        assert_eq!(offer.try_reserve(), Decision::Accept);
        assert!(offer.commit(7, 1));
    }

    #[test]
    fn busy_reservation_is_still_winnable_after_release() {
        let offer: Offer<i32> = Offer::new();
        assert_eq!(offer.try_reserve(), Decision::Accept);
        // A second, concurrent candidate pairing (e.g. a different channel
        // in the same alt) sees contention, not a terminal decline.
        assert_eq!(offer.try_reserve(), Decision::Busy);
        assert_eq!(offer.state(), OfferState::Probing);
        offer.release();
        // Once released, the Offer is winnable again.
        assert_eq!(offer.try_reserve(), Decision::Accept);
        assert!(offer.commit(3, 9));
    }

    #[test]
    fn withdraw_after_commit_is_noop() {
        let offer: Offer<i32> = Offer::new();
        assert_eq!(offer.try_reserve(), Decision::Accept);
        assert!(offer.commit(1, 0));
        assert!(!offer.withdraw(CspError::Timeout));
        assert_eq!(offer.state(), OfferState::Committed);
    }

    #[test]
    fn withdraw_blocks_future_reservations() {
        let offer: Offer<i32> = Offer::new();
        assert!(offer.withdraw(CspError::Cancelled));
        assert_eq!(offer.try_reserve(), Decision::Decline);
    }

    #[test]
    fn commit_callback_runs_before_result_observed() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool as StdAtomicBool;
        let ran = Arc::new(StdAtomicBool::new(false));
        let offer: Offer<i32> = Offer::new();
        let ran_c = ran.clone();
        offer.set_commit_callback(move || ran_c.store(true, Ordering::SeqCst));
        assert_eq!(offer.try_reserve(), Decision::Accept);
        offer.commit(1, 5);
        assert!(ran.load(Ordering::SeqCst));
    }
}
