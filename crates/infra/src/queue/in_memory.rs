//! In-memory queue store for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use super::{QueueError, QueueStore};

/// Test double with the same head-insert/tail-remove contract as the
/// Redis store.
#[derive(Default)]
pub struct InMemoryQueueStore {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    notify: Notify,
    pop_errors: AtomicUsize,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items currently waiting under `key`.
    pub async fn len(&self, key: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(key)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Make the next `n` pop attempts fail with a transient error, for
    /// exercising the worker's retry path.
    pub fn inject_pop_errors(&self, n: usize) {
        self.pop_errors.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn push(&self, key: &str, payload: String) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        queues.entry(key.to_string()).or_default().push_front(payload);
        drop(queues);
        self.notify.notify_one();
        Ok(())
    }

    async fn blocking_pop(
        &self,
        key: &str,
        shutdown: &CancellationToken,
    ) -> Result<String, QueueError> {
        loop {
            if shutdown.is_cancelled() {
                return Err(QueueError::Cancelled);
            }
            if self
                .pop_errors
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(QueueError::Transient("injected pop failure".to_string()));
            }
            {
                let mut queues = self.queues.lock().await;
                if let Some(queue) = queues.get_mut(key) {
                    if let Some(item) = queue.pop_back() {
                        return Ok(item);
                    }
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return Err(QueueError::Cancelled),
                _ = self.notify.notified() => {}
            }
        }
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
