//! A value that can be observed by an arbitrary number of observer streams.
//!
//! The ingestor publishes its consumer state through a [`Variable`]; the
//! subscription engine reads the current value when deciding whether a new
//! subscription may attach, and interested tasks can await transitions as a
//! stream. Observers only ever see the most recent value.

use fnv::FnvHashMap;
use futures::{stream::FusedStream, Stream};
use parking_lot::Mutex;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

#[derive(Debug)]
pub struct Variable<T> {
    inner: Arc<Mutex<VariableInner<T>>>,
}

impl<T> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Variable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VariableInner::new(value))),
        }
    }

    /// Set the value and notify all current observers. Never fails; with no
    /// observers the value is just stored.
    pub fn set(&self, value: T) {
        self.inner.lock().set(value)
    }

    /// Read and project out of the current value without cloning it.
    pub fn project<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        f(&self.inner.lock().latest)
    }

    pub fn new_observer(&self) -> Observer<T> {
        Observer::new(self.inner.clone())
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

impl<T: Copy> Variable<T> {
    pub fn get(&self) -> T {
        self.inner.lock().latest
    }
}

impl<T: Clone> Variable<T> {
    pub fn get_cloned(&self) -> T {
        self.inner.lock().latest.clone()
    }
}

impl<T: Default> Default for Variable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Stream of values observed from a [`Variable`]; yields the current value
/// once on attach and then only changes, skipping intermediates the
/// observer was too slow for.
pub struct Observer<T> {
    id: usize,
    inner: Arc<Mutex<VariableInner<T>>>,
}

impl<T> Observer<T> {
    fn new(inner: Arc<Mutex<VariableInner<T>>>) -> Self {
        let id = inner.lock().new_observer_id();
        Self { id, inner }
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Observer::new(self.inner.clone())
    }
}

impl<T> Unpin for Observer<T> {}

impl<T: Clone> Stream for Observer<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let id = self.id;
        let mut inner = self.inner.lock();
        match inner.observers.get_mut(&id) {
            Some(slot) if slot.received => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Some(slot) => {
                slot.received = true;
                Poll::Ready(Some(inner.latest.clone()))
            }
            None => Poll::Ready(None),
        }
    }
}

impl<T: Clone> FusedStream for Observer<T> {
    fn is_terminated(&self) -> bool {
        !self.inner.lock().observers.contains_key(&self.id)
    }
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        self.inner.lock().observers.remove(&self.id);
    }
}

#[derive(Debug)]
struct VariableInner<T> {
    next_id: usize,
    observers: FnvHashMap<usize, ObserverSlot>,
    latest: T,
}

impl<T> VariableInner<T> {
    fn new(value: T) -> Self {
        Self {
            next_id: 0,
            observers: Default::default(),
            latest: value,
        }
    }

    fn set(&mut self, value: T) {
        self.latest = value;
        for slot in self.observers.values_mut() {
            slot.received = false;
            if let Some(waker) = slot.waker.take() {
                waker.wake();
            }
        }
    }

    fn new_observer_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.insert(id, ObserverSlot::default());
        id
    }
}

#[derive(Debug, Default)]
struct ObserverSlot {
    received: bool,
    waker: Option<Waker>,
}
