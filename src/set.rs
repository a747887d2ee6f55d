//! [`ChannelSet`]: an ordered, named group of channels with a persistent
//! fairness cursor, the only vehicle through which [`Priority::Fair`]
//! (spec.md §4.3) is available.
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::alt::{read_from_any, read_from_any_cancellable, write_to_any, write_to_any_cancellable};
use crate::channel::Channel;
use crate::error::CspResult;
use crate::priority::Priority;
use crate::timer::CancelToken;

/// An ordered collection of same-type channels that remembers, across
/// calls, which index to start posting from next — the state `Fair`
/// priority needs and that an ad-hoc candidate list has nowhere to keep.
pub struct ChannelSet<T> {
    channels: Mutex<Vec<Channel<T>>>,
    cursor: AtomicUsize,
}

impl<T: Send + 'static> ChannelSet<T> {
    pub fn new(channels: Vec<Channel<T>>) -> Self {
        Self {
            channels: Mutex::new(channels),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, channel: Channel<T>) {
        self.channels.lock().unwrap().push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current fairness cursor: the index `Fair` posting starts at.
    pub(crate) fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Advances the cursor past the channel that most recently won, so the
    /// next `Fair` alt starts immediately after it (spec.md §4.3: "wraps
    /// around the set").
    pub(crate) fn advance_cursor(&self, winner_index: usize, len: usize) {
        if len == 0 {
            return;
        }
        self.cursor.store((winner_index + 1) % len, Ordering::Release);
    }

    fn snapshot(&self) -> Vec<Channel<T>> {
        self.channels.lock().unwrap().clone()
    }

    /// Reads from whichever member channel is ready first, honoring
    /// `priority` (including `Fair`, which only this entry point supports).
    pub fn read_any(&self, priority: Priority, deadline: Option<Duration>) -> CspResult<(usize, T)> {
        let channels = self.snapshot();
        read_from_any(&channels, priority, deadline, Some(self))
    }

    pub fn write_any(
        &self,
        values: Vec<T>,
        priority: Priority,
        deadline: Option<Duration>,
    ) -> CspResult<usize> {
        let channels = self.snapshot();
        write_to_any(&channels, values, priority, deadline, Some(self))
    }

    /// Same as [`ChannelSet::read_any`], additionally racing `cancel`
    /// against the deadline and any pairing (spec.md §4.4).
    pub fn read_any_cancellable(
        &self,
        priority: Priority,
        deadline: Option<Duration>,
        cancel: CancelToken,
    ) -> CspResult<(usize, T)> {
        let channels = self.snapshot();
        read_from_any_cancellable(&channels, priority, deadline, Some(self), cancel)
    }

    /// Same as [`ChannelSet::write_any`], additionally racing `cancel`
    /// against the deadline and any pairing (spec.md §4.4).
    pub fn write_any_cancellable(
        &self,
        values: Vec<T>,
        priority: Priority,
        deadline: Option<Duration>,
        cancel: CancelToken,
    ) -> CspResult<usize> {
        let channels = self.snapshot();
        write_to_any_cancellable(&channels, values, priority, deadline, Some(self), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    #[test]
    fn cursor_wraps_after_advancing_past_last_index() {
        let set: ChannelSet<i32> = ChannelSet::new(vec![Channel::new(), Channel::new(), Channel::new()]);
        set.advance_cursor(2, 3);
        assert_eq!(set.cursor(), 0);
        set.advance_cursor(0, 3);
        assert_eq!(set.cursor(), 1);
    }
}
