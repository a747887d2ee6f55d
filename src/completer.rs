//! The tagged-union completer interface.
//!
//! spec.md §9 calls for "a tagged-union completer interface (`setResult(any)`,
//! `setException(err)`, `setCancelled()`), not reflection" as the
//! reimplementation of the original's reflective task-completion hookup.
//! [`Completer<T>`] is that interface: a single-assignment result slot
//! shared between whichever thread eventually wins a pairing and whichever
//! thread (or task) is waiting on the outcome.
//!
//! Like the teacher's `SendFuture`/`RecvFuture` (`spsc/sender.rs`,
//! `spsc/receiver.rs`), a `Completer` is pollable without any async runtime
//! at all: [`Completer::wait`] blocks the calling thread with a `Condvar`,
//! while [`Completer::future`] (under the default `async` feature) exposes
//! the same slot as a `Future`, backed by a `futures::task::AtomicWaker`
//! exactly as the teacher's futures are.
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::error::CspError;

#[cfg(feature = "async")]
use futures::task::AtomicWaker;
#[cfg(feature = "async")]
use std::task::{Context, Poll};

/// A single-assignment result slot. Whoever calls [`Completer::set_result`]
/// first wins; later calls are silently ignored (mirroring `Offer::commit`'s
/// "double-commit is impossible by construction" guarantee one layer up).
pub struct Completer<T> {
    slot: Mutex<Option<Result<T, CspError>>>,
    condvar: Condvar,
    #[cfg(feature = "async")]
    waker: AtomicWaker,
}

impl<T> Completer<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            condvar: Condvar::new(),
            #[cfg(feature = "async")]
            waker: AtomicWaker::new(),
        }
    }

    /// Sets the result exactly once. A second call is a silent no-op: by
    /// the time two results could race here, the [`Offer`](crate::offer::Offer)
    /// above this completer has already ensured at most one caller ever
    /// reaches this point for real (timer/commit races resolve at the Offer,
    /// not here) — this guard exists so the completer itself can never be
    /// made to panic by a defect elsewhere.
    pub fn set_result(&self, result: Result<T, CspError>) {
        {
            let mut slot = self.slot.lock().unwrap();
            if slot.is_some() {
                return;
            }
            *slot = Some(result);
        }
        self.condvar.notify_all();
        #[cfg(feature = "async")]
        self.waker.wake();
    }

    pub fn set_exception(&self, err: CspError) {
        self.set_result(Err(err));
    }

    pub fn set_cancelled(&self) {
        self.set_result(Err(CspError::Cancelled));
    }

    pub fn is_ready(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    /// Blocks the calling thread until a result is set, or `deadline`
    /// elapses (`None` means wait forever).
    pub fn wait(&self, deadline: Option<Instant>) -> Result<T, CspError> {
        let mut slot = self.slot.lock().unwrap();
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            slot = match deadline {
                None => self.condvar.wait(slot).unwrap(),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(CspError::Timeout);
                    }
                    let (guard, timeout) = self.condvar.wait_timeout(slot, d - now).unwrap();
                    if timeout.timed_out() && guard.is_none() {
                        return Err(CspError::Timeout);
                    }
                    guard
                }
            };
        }
    }

    #[cfg(feature = "async")]
    pub fn future(&self) -> CompleterFuture<'_, T> {
        CompleterFuture { completer: self }
    }

    /// Polls the result slot directly, registering `cx`'s waker first so no
    /// wakeup landing between the check and the registration is missed —
    /// the same ordering [`CompleterFuture::poll`] delegates to. Exposed
    /// so the channel and alt engine can build their own owned futures
    /// (`ReadFuture`, `WriteFuture`, ...) around a `Completer` they hold
    /// without borrowing a `CompleterFuture<'_, T>` tied to a temporary.
    #[cfg(feature = "async")]
    pub fn poll(&self, cx: &mut Context<'_>) -> Poll<Result<T, CspError>> {
        self.waker.register(cx.waker());
        let mut slot = self.slot.lock().unwrap();
        match slot.take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

impl<T> Default for Completer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "async")]
pub use r#async::CompleterFuture;

#[cfg(feature = "async")]
mod r#async {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Future view of a [`Completer`]'s result slot.
    ///
    /// Cancel-safe: dropping this future before it resolves loses nothing —
    /// the completer itself keeps the result (or keeps waiting for one),
    /// and a later `.future()`/`.wait()` call observes it.
    #[must_use = "futures do nothing unless polled"]
    pub struct CompleterFuture<'a, T> {
        pub(super) completer: &'a Completer<T>,
    }

    impl<T> Unpin for CompleterFuture<'_, T> {}

    impl<T> Future for CompleterFuture<'_, T> {
        type Output = Result<T, CspError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            self.completer.poll(cx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn set_result_wakes_blocked_waiter() {
        let completer: Arc<Completer<i32>> = Arc::new(Completer::new());
        let c = completer.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            c.set_result(Ok(42));
        });
        assert_eq!(completer.wait(None), Ok(42));
        handle.join().unwrap();
    }

    #[test]
    fn wait_respects_deadline() {
        let completer: Completer<i32> = Completer::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(completer.wait(Some(deadline)), Err(CspError::Timeout));
    }

    #[test]
    fn second_set_result_is_ignored() {
        let completer: Completer<i32> = Completer::new();
        completer.set_result(Ok(1));
        completer.set_result(Ok(2));
        assert_eq!(completer.wait(None), Ok(1));
    }
}
