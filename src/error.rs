//! Error taxonomy for the channel core.
//!
//! Every failure a caller can observe from a read, write, or alt operation is
//! one of the kinds below. The core never logs and never swallows a failure:
//! it always surfaces through the caller's [`Completer`](crate::completer::Completer).

use thiserror::Error;

/// The reason a channel operation did not produce a value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CspError {
    /// The deadline elapsed before any pairing committed. Recoverable: the
    /// caller may retry.
    #[error("deadline elapsed before commit")]
    Timeout,

    /// An external cancellation signal fired before any pairing committed.
    /// Recoverable.
    #[error("operation cancelled")]
    Cancelled,

    /// The channel reached `Retired` while the request was live, or was
    /// already `Retired` when the request arrived. Not recoverable for that
    /// channel.
    #[error("channel retired")]
    Retired,

    /// Enqueuing would have exceeded a pending-reader or pending-writer cap
    /// under the `Reject` policy, or this request was evicted under `Lifo`
    /// or `FifoDropHead`. Recoverable: the caller may retry.
    #[error("pending queue overflow")]
    OverflowRejected,

    /// A programmer error: an empty alt list, `Fair` priority requested
    /// outside an explicit `ChannelSet`, or a read and a write posted
    /// against the same channel within one alt.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
}

impl CspError {
    /// True for errors a caller can sensibly retry (as opposed to
    /// [`CspError::Retired`] and [`CspError::InvalidOperation`]).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CspError::Timeout | CspError::Cancelled | CspError::OverflowRejected
        )
    }
}

pub type CspResult<T> = Result<T, CspError>;
