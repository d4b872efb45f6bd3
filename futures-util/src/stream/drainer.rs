use futures::{
    executor::LocalPool,
    future::ready,
    stream::{self, Stream, StreamExt},
    task::LocalSpawnExt,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Test helper that turns a stream into a synchronous iterator of batches.
///
/// Each `next()` runs the stream's task until it stalls and returns the
/// items produced since the previous call; an empty vector means the stream
/// is alive but currently pending, `None` means it ended. This makes
/// assertions about *when* a stream emits deterministic without timers.
pub struct Drainer<T> {
    acc: Arc<Mutex<Vec<T>>>,
    done: Arc<AtomicBool>,
    pool: LocalPool,
}

impl<T: 'static> Drainer<T> {
    pub fn new<St: Stream<Item = T> + 'static>(stream: St) -> Drainer<T> {
        let acc = Arc::new(Mutex::new(Vec::<T>::new()));
        let done = Arc::new(AtomicBool::new(false));

        let acc2 = acc.clone();
        let done2 = done.clone();
        let pool = LocalPool::new();
        pool.spawner()
            .spawn_local(
                stream
                    .filter_map(move |x| {
                        acc2.lock().unwrap().push(x);
                        ready(None)
                    })
                    .chain(stream::iter([()]).map(move |_| {
                        done2.store(true, Ordering::Release);
                    }))
                    .for_each(|_| ready(())),
            )
            .expect("cannot spawn stream");

        Drainer { acc, done, pool }
    }
}

impl<T: Clone> Iterator for Drainer<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pool.run_until_stalled();

        let mut acc = self.acc.lock().unwrap();
        if !acc.is_empty() {
            let batch = acc.clone();
            acc.clear();
            return Some(batch);
        }
        if self.done.load(Ordering::Acquire) {
            return None;
        }
        Some(Vec::new())
    }
}
