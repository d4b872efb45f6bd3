//! The in-process broadcast point for one upstream topic.
//!
//! The ingestor publishes here; subscriptions attach here. A bounded replay
//! ring bridges the gap between a subscription attaching and its first
//! read, which is what makes the snapshot-to-live hand-off race-free: the
//! engine attaches *before* fetching the snapshot and finds everything that
//! arrived meanwhile in its inbox.

use crate::inbox::{inbox, Inbox, InboxSender};
use blotter_sdk::Event;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

#[derive(Clone)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
    inbox_capacity: usize,
}

struct HubInner {
    replay: VecDeque<Arc<Event>>,
    replay_capacity: usize,
    subscribers: Vec<InboxSender>,
}

impl EventHub {
    pub fn new(replay_capacity: usize, inbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                replay: VecDeque::with_capacity(replay_capacity),
                replay_capacity,
                subscribers: Vec::new(),
            })),
            inbox_capacity,
        }
    }

    pub fn publish(&self, event: Event) {
        self.publish_shared(Arc::new(event));
    }

    /// Record the event in the replay ring and fan it out. Never blocks:
    /// slow subscribers overflow their own inbox, dead ones are pruned.
    pub fn publish_shared(&self, event: Arc<Event>) {
        let mut inner = self.inner.lock();
        inner.replay.push_back(event.clone());
        if inner.replay.len() > inner.replay_capacity {
            inner.replay.pop_front();
        }
        inner.subscribers.retain(|sub| sub.push(event.clone()));
    }

    /// Attach a new subscription. The replay window is loaded into the
    /// fresh inbox before any live event can arrive, in order.
    pub fn subscribe(&self) -> Inbox {
        let (tx, rx) = inbox(self.inbox_capacity);
        let mut inner = self.inner.lock();
        for event in &inner.replay {
            tx.push(event.clone());
        }
        inner.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    #[cfg(test)]
    pub(crate) fn replay_len(&self) -> usize {
        self.inner.lock().replay.len()
    }
}
