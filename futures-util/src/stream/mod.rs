mod drainer;
mod take_until_signaled;
mod yield_after;

pub mod variable;

pub use drainer::Drainer;
pub use take_until_signaled::TakeUntilSignaled;
pub use variable::Variable;
pub use yield_after::YieldAfter;

use futures::{Future, Stream};

pub trait BlotterStreamExt: Stream + Sized {
    /// End the stream as soon as the given future resolves, regardless of
    /// items still pending in the inner stream. Used to merge transport
    /// cancellation into response streams.
    fn take_until_signaled<F>(self, signal: F) -> TakeUntilSignaled<Self, F>
    where
        F: Future,
    {
        TakeUntilSignaled::new(self, signal)
    }

    /// Reschedule the task after `n` consecutive ready polls so one busy
    /// stream cannot starve its siblings on the same connection.
    fn yield_after(self, n: u64) -> YieldAfter<Self> {
        YieldAfter::new(self, n)
    }
}

impl<St: Stream + Sized> BlotterStreamExt for St {}
