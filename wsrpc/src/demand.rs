//! Credit-based demand accounting for response streams.
//!
//! A request opened with an explicit `demand` starts with that many stream
//! credits; each `Next` frame spends one, and `Demand` frames top the
//! account up. At zero credits the response stream parks: items stay in
//! the producing component's bounded buffers (where the overflow policy
//! applies) instead of piling up in the socket. The gate admits one element
//! of read-ahead so that stream completion is observed and delivered even
//! while no credits are outstanding.

use futures::{
    task::{Context, Poll, Waker},
    Stream,
};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::{pin::Pin, sync::Arc};

#[derive(Clone, Debug)]
pub struct DemandGate {
    inner: Arc<Mutex<DemandInner>>,
}

#[derive(Debug)]
struct DemandInner {
    /// `None` means unaccounted: the stream is never parked.
    credits: Option<u64>,
    waker: Option<Waker>,
}

impl DemandGate {
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn with_initial(credits: u64) -> Self {
        Self::new(Some(credits))
    }

    fn new(credits: Option<u64>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DemandInner { credits, waker: None })),
        }
    }

    /// Add credits and wake the parked stream if there is one. No-op on an
    /// unaccounted gate.
    pub fn grant(&self, additional: u64) {
        let mut inner = self.inner.lock();
        if let Some(credits) = inner.credits.as_mut() {
            *credits = credits.saturating_add(additional);
            if let Some(waker) = inner.waker.take() {
                waker.wake();
            }
        }
    }

    fn poll_take(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.inner.lock();
        match inner.credits.as_mut() {
            None => Poll::Ready(()),
            Some(0) => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Some(credits) => {
                *credits -= 1;
                Poll::Ready(())
            }
        }
    }

    #[cfg(test)]
    fn remaining(&self) -> Option<u64> {
        self.inner.lock().credits
    }
}

pin_project! {
    /// Stream adapter spending one credit of `gate` per item.
    #[must_use = "streams do nothing unless polled"]
    pub struct Demanded<St: Stream> {
        #[pin]
        stream: St,
        gate: DemandGate,
        pending: Option<St::Item>,
    }
}

impl<St: Stream> Demanded<St> {
    pub fn new(stream: St, gate: DemandGate) -> Self {
        Self {
            stream,
            gate,
            pending: None,
        }
    }
}

impl<St: Stream> Stream for Demanded<St> {
    type Item = St::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<St::Item>> {
        let this = self.project();
        if this.pending.is_none() {
            match this.stream.poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                // completion does not consume a credit
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
        match this.gate.poll_take(cx) {
            Poll::Ready(()) => Poll::Ready(this.pending.take()),
            Poll::Pending => Poll::Pending,
        }
    }
}
