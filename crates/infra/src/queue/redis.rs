//! Redis-list-backed queue store.

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use super::{QueueError, QueueStore};

/// How long each BRPOP attempt waits before re-checking for shutdown.
/// Bounded so cancellation is observed promptly without racing the pop
/// itself (a popped item is always returned, never discarded).
const POP_POLL_SECONDS: f64 = 1.0;

/// Queue store over a Redis list: LPUSH on enqueue, BRPOP on the
/// worker side.
#[derive(Debug, Clone)]
pub struct RedisQueueStore {
    client: redis::Client,
}

impl RedisQueueStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push(&self, key: &str, payload: String) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .lpush(key, payload)
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn blocking_pop(
        &self,
        key: &str,
        shutdown: &CancellationToken,
    ) -> Result<String, QueueError> {
        let mut conn = self.connection().await?;
        loop {
            if shutdown.is_cancelled() {
                return Err(QueueError::Cancelled);
            }
            let reply: Option<(String, String)> = conn
                .brpop(key, POP_POLL_SECONDS)
                .await
                .map_err(|e| QueueError::Transient(e.to_string()))?;
            match reply {
                Some((_, payload)) => return Ok(payload),
                // Timed out empty; loop around and look again.
                None => continue,
            }
        }
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::Transient(e.to_string()))?;
        Ok(())
    }
}
