//! Deadlines and cancellation (spec.md §4.4).
//!
//! Neither primitive here touches an async runtime: a deadline is a
//! dedicated OS thread that sleeps then withdraws its Offer; a
//! [`CancelToken`] is watched by a second dedicated thread that polls at a
//! short, fixed interval. Both are deliberately simple — correct and cheap
//! enough for the volumes spec.md targets, at the cost of up to one poll
//! interval of added latency on the cancel path (documented trade-off, not
//! an oversight: a condvar-based watcher would need a second notification
//! path threaded through every commit/withdraw site for no latency
//! improvement worth the complexity at this scale).
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CspError;
use crate::offer::Offer;

/// Spawns a thread that withdraws `offer` with [`CspError::Timeout`] once
/// `deadline` elapses, unless the offer has already resolved. A no-op
/// withdraw (because the offer committed first) is expected and silent.
pub(crate) fn spawn_deadline<T: Send + 'static>(offer: Arc<Offer<T>>, deadline: Instant) {
    thread::spawn(move || {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        offer.withdraw(CspError::Timeout);
    });
}

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A cooperative cancellation signal shared by the caller of an alt and the
/// watcher thread spawned with [`spawn_cancel_watch`].
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a thread that withdraws `offer` with [`CspError::Cancelled`] as
/// soon as `token` is cancelled, or exits quietly once the offer resolves
/// by any other means (commit or timeout).
pub(crate) fn spawn_cancel_watch<T: Send + 'static>(offer: Arc<Offer<T>>, token: CancelToken) {
    thread::spawn(move || {
        loop {
            if !offer.is_probing() {
                return;
            }
            if token.is_cancelled() {
                offer.withdraw(CspError::Cancelled);
                return;
            }
            thread::sleep(CANCEL_POLL_INTERVAL);
        }
    });
}
