use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Runs submitted operations so that those sharing a key execute one after
/// another in submission order. Operations on different keys run
/// independently.
#[derive(Default)]
pub struct KeyedQueue {
    tails: Mutex<HashMap<String, Tail>>,
    next_seq: AtomicU64,
}

struct Tail {
    seq: u64,
    done: oneshot::Receiver<()>,
}

impl KeyedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `op` behind every earlier operation submitted for `key`.
    ///
    /// The position in the queue is fixed when this returns, not when the
    /// task is first polled. Must be called within a Tokio runtime.
    pub fn submit<F>(self: &Arc<Self>, key: &str, op: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();

        let previous = self
            .tails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Tail { seq, done: done_rx });

        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Some(previous) = previous {
                // an Err means the predecessor's task went away; either way it is finished
                let _ = previous.done.await;
            }
            op.await;
            let _ = done_tx.send(());
            queue.release(&key, seq);
        })
    }

    /// Number of keys with an operation queued or running.
    #[cfg(test)]
    pub fn pending_keys(&self) -> usize {
        self.tails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, key: &str, seq: u64) {
        let mut tails = self.tails.lock().unwrap_or_else(PoisonError::into_inner);
        if tails.get(key).map(|tail| tail.seq) == Some(seq) {
            tails.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_runs_in_submission_order() {
        let queue = Arc::new(KeyedQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        // earlier operations sleep longer, so unordered execution would reverse them
        for (step, delay) in [(1u32, 30u64), (2, 20), (3, 10), (4, 0)] {
            let log = log.clone();
            handles.push(queue.submit("same", async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().unwrap().push(step);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(queue.pending_keys(), 0);
    }

    #[tokio::test]
    async fn blocked_key_does_not_hold_up_others() {
        let queue = Arc::new(KeyedQueue::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let log = Arc::new(Mutex::new(Vec::new()));

        let blocked = {
            let log = log.clone();
            queue.submit("a", async move {
                let _ = release_rx.await;
                log.lock().unwrap().push("a");
            })
        };
        let free = {
            let log = log.clone();
            queue.submit("b", async move {
                log.lock().unwrap().push("b");
            })
        };

        free.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
        assert_eq!(queue.pending_keys(), 1);

        release_tx.send(()).unwrap();
        blocked.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
        assert_eq!(queue.pending_keys(), 0);
    }

    #[tokio::test]
    async fn panicking_predecessor_does_not_wedge_the_key() {
        let queue = Arc::new(KeyedQueue::new());

        let first = queue.submit("k", async {
            panic!("boom");
        });
        let ran = Arc::new(Mutex::new(false));
        let second = {
            let ran = ran.clone();
            queue.submit("k", async move {
                *ran.lock().unwrap() = true;
            })
        };

        assert!(first.await.is_err());
        second.await.unwrap();
        assert!(*ran.lock().unwrap());
    }
}
