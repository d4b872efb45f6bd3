//! Latest-event-per-key cache with terminal-first eviction.
//!
//! Backs the point snapshot routes and serves as fallback when the external
//! query API is unreachable. Off the hot per-event emission path: only the
//! ingestor writes, only snapshot requests read.

use blotter_sdk::Event;
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

#[derive(Clone)]
pub struct BlotterCache {
    inner: Arc<Mutex<CacheInner>>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    /// Monotonic update recency; bumped on every put.
    clock: u64,
    evictions: u64,
}

struct CacheEntry {
    event: Arc<Event>,
    touched: u64,
}

impl BlotterCache {
    /// `max_entries` is a hard bound with no default; the settings layer
    /// refuses to start without one.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::with_capacity(max_entries.min(1024)),
                capacity: max_entries.max(1),
                clock: 0,
                evictions: 0,
            })),
        }
    }

    /// Insert or refresh the entry for the event's business key, evicting
    /// first if the bound is reached. Never blocks beyond the lock.
    pub fn put(&self, event: Arc<Event>) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let touched = inner.clock;
        let key = event.key();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.event = event;
            entry.touched = touched;
            return;
        }
        if inner.entries.len() >= inner.capacity {
            inner.evict();
        }
        inner.entries.insert(key.to_owned(), CacheEntry { event, touched });
    }

    pub fn get(&self, key: &str) -> Option<Arc<Event>> {
        self.inner.lock().entries.get(key).map(|e| e.event.clone())
    }

    /// Current contents, ordered by business key for stable output.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        let inner = self.inner.lock();
        let mut entries: Vec<_> = inner.entries.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.into_iter().map(|(_, e)| e.event.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }
}

impl CacheInner {
    /// Evict the least recently updated terminal entry, or the least
    /// recently updated entry overall if no terminal one exists.
    fn evict(&mut self) {
        let victim = self
            .entries
            .iter()
            .filter(|(_, e)| e.event.payload.is_terminal())
            .min_by_key(|(_, e)| e.touched)
            .or_else(|| self.entries.iter().min_by_key(|(_, e)| e.touched))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions += 1;
            tracing::debug!(key = %key, evictions = self.evictions, "evicted cache entry");
        }
    }
}
