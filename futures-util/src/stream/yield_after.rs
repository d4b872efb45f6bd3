use futures::{
    stream::Stream,
    task::{Context, Poll},
    StreamExt,
};
use pin_project_lite::pin_project;
use std::pin::Pin;

pin_project! {
    /// Stream for the [`yield_after`](super::BlotterStreamExt::yield_after) method.
    ///
    /// Resubmits the task after `n` consecutive successful polls even if the
    /// inner stream would be ready again. On an executor with a fair run
    /// queue this bounds how long one response stream can monopolise a
    /// connection's forwarding task.
    #[must_use = "streams do nothing unless polled"]
    pub struct YieldAfter<St> {
        #[pin]
        stream: St,
        budget: u64,
        remaining: u64,
    }
}

impl<St: Stream> YieldAfter<St> {
    pub fn new(stream: St, n: u64) -> Self {
        Self {
            stream,
            budget: n,
            remaining: n,
        }
    }
}

impl<St: Stream> Stream for YieldAfter<St> {
    type Item = St::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<St::Item>> {
        let mut this = self.project();
        if *this.remaining == 0 {
            *this.remaining = *this.budget;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        match this.stream.poll_next_unpin(cx) {
            Poll::Ready(next) => {
                *this.remaining -= 1;
                Poll::Ready(next)
            }
            Poll::Pending => {
                *this.remaining = *this.budget;
                Poll::Pending
            }
        }
    }
}
