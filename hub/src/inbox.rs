//! The bounded queue between the hub and one subscription's emission loop.
//!
//! Single producer (the hub's publishing thread), single consumer (the
//! emission loop). Overflow drops the *oldest* buffered event and counts
//! the drop, so a stalled client degrades only its own stream and never
//! parks the producer.

use blotter_sdk::Event;
use futures::Stream;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

pub fn inbox(capacity: usize) -> (InboxSender, Inbox) {
    let inner = Arc::new(Mutex::new(InboxInner {
        queue: VecDeque::with_capacity(capacity),
        capacity,
        dropped: 0,
        waker: None,
        sender_gone: false,
        receiver_gone: false,
    }));
    (InboxSender { inner: inner.clone() }, Inbox { inner })
}

struct InboxInner {
    queue: VecDeque<Arc<Event>>,
    capacity: usize,
    dropped: u64,
    waker: Option<Waker>,
    sender_gone: bool,
    receiver_gone: bool,
}

pub struct InboxSender {
    inner: Arc<Mutex<InboxInner>>,
}

impl InboxSender {
    /// Enqueue without blocking. At capacity the oldest buffered event is
    /// discarded and the overflow counter incremented. Returns false once
    /// the receiver is gone, so the hub can prune this sender.
    pub fn push(&self, event: Arc<Event>) -> bool {
        let mut inner = self.inner.lock();
        if inner.receiver_gone {
            return false;
        }
        if inner.queue.len() == inner.capacity {
            inner.queue.pop_front();
            inner.dropped += 1;
        }
        inner.queue.push_back(event);
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
        true
    }

    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

impl Drop for InboxSender {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.sender_gone = true;
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }
}

pub struct Inbox {
    inner: Arc<Mutex<InboxInner>>,
}

impl Inbox {
    /// Events discarded because this subscription was too slow.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Stream for Inbox {
    type Item = Arc<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Arc<Event>>> {
        let mut inner = self.inner.lock();
        if let Some(event) = inner.queue.pop_front() {
            return Poll::Ready(Some(event));
        }
        if inner.sender_gone {
            return Poll::Ready(None);
        }
        inner.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Unpin for Inbox {}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.inner.lock().receiver_gone = true;
    }
}
