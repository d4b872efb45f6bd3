use futures::{
    future::Future,
    stream::{FusedStream, Stream},
    task::{Context, Poll},
};
use pin_project_lite::pin_project;
use std::pin::Pin;

pin_project! {
    /// Stream for the [`take_until_signaled`](super::BlotterStreamExt::take_until_signaled) method.
    ///
    /// The signal future is polled before the inner stream, so a resolved
    /// signal wins even when the inner stream has items ready. Dropping the
    /// signal's sender counts as a signal when the future resolves on that.
    #[must_use = "streams do nothing unless polled"]
    pub struct TakeUntilSignaled<St, F> {
        #[pin]
        stream: St,
        #[pin]
        signal: F,
        signaled: bool,
    }
}

impl<St, F> TakeUntilSignaled<St, F>
where
    St: Stream,
    F: Future,
{
    pub fn new(stream: St, signal: F) -> Self {
        Self {
            stream,
            signal,
            signaled: false,
        }
    }
}

impl<St, F> Stream for TakeUntilSignaled<St, F>
where
    St: Stream,
    F: Future,
{
    type Item = St::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<St::Item>> {
        let this = self.project();
        if *this.signaled {
            return Poll::Ready(None);
        }
        if this.signal.poll(cx).is_ready() {
            *this.signaled = true;
            return Poll::Ready(None);
        }
        this.stream.poll_next(cx)
    }
}

impl<St, F> FusedStream for TakeUntilSignaled<St, F>
where
    St: FusedStream,
    F: Future,
{
    fn is_terminated(&self) -> bool {
        self.signaled || self.stream.is_terminated()
    }
}
