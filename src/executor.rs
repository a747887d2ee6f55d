//! The executor seam (spec.md §7): how background work — timer threads,
//! cancel watchers, and user-scheduled tasks — actually gets run, and how a
//! caller can wait for outstanding work to wind down before shutdown.
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Something that can run a unit of work and, later, be asked to confirm
/// everything it was given has finished.
pub trait Executor: Send + Sync {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>);

    /// Blocks until every task spawned so far has completed, or `deadline`
    /// elapses. Returns `false` on timeout.
    fn ensure_finished(&self, deadline: Option<Duration>) -> bool;
}

/// The simplest possible [`Executor`]: one OS thread per task, joined on
/// [`ThreadSpawnExecutor::ensure_finished`]. Adequate at the scale spec.md
/// targets; a pooled executor is one `Executor` impl away if a caller wants
/// one, without anything elsewhere in the crate depending on which.
pub struct ThreadSpawnExecutor {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadSpawnExecutor {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }
}

impl Default for ThreadSpawnExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadSpawnExecutor {
    fn spawn(&self, task: Box<dyn FnOnce() + Send>) {
        let handle = thread::spawn(task);
        self.handles.lock().unwrap().push(handle);
    }

    fn ensure_finished(&self, deadline: Option<Duration>) -> bool {
        let deadline_at = deadline.map(|d| Instant::now() + d);
        let mut handles = self.handles.lock().unwrap();
        let mut remaining = Vec::new();
        for handle in handles.drain(..) {
            if let Some(at) = deadline_at {
                if Instant::now() >= at {
                    remaining.push(handle);
                    continue;
                }
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else if deadline_at.is_none() {
                let _ = handle.join();
            } else {
                remaining.push(handle);
            }
        }
        let all_done = remaining.is_empty();
        *handles = remaining;
        all_done
    }
}

/// A shared, type-erased handle to an [`Executor`] implementation, the form
/// most of the crate actually stores.
pub type SharedExecutor = Arc<dyn Executor>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn spawned_tasks_run_and_join() {
        let executor = ThreadSpawnExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = counter.clone();
            executor.spawn(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(executor.ensure_finished(None));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
