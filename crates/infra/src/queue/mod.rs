//! Durable FIFO transport for background tasks.
//!
//! Producers insert at the head, the single worker removes from the
//! tail. A popped payload is gone from the store whatever happens to it
//! afterwards; delivery is at-most-once by construction.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod in_memory;
pub mod redis;

pub use in_memory::InMemoryQueueStore;
pub use redis::RedisQueueStore;

/// Errors surfaced by the queue layer.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Enqueue attempted before `TaskQueue::start` succeeded.
    #[error("async queue has not been started")]
    NotStarted,

    /// Connectivity/IO failure talking to the store. Pop-side callers
    /// retry these; enqueue-side callers see them directly.
    #[error("queue store unavailable: {0}")]
    Transient(String),

    /// The task could not be encoded for the wire.
    #[error("failed to encode task: {0}")]
    Encode(String),

    /// The blocking pop observed shutdown instead of an item.
    #[error("queue operation cancelled")]
    Cancelled,
}

/// A Redis-list-shaped store: head insert, blocking tail remove.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert `payload` at the head of `key`.
    async fn push(&self, key: &str, payload: String) -> Result<(), QueueError>;

    /// Remove and return the tail item of `key`, waiting until one is
    /// available or `shutdown` fires (then `QueueError::Cancelled`).
    ///
    /// Implementations must not lose an item to cancellation: once a
    /// payload has been removed from the store it is returned.
    async fn blocking_pop(
        &self,
        key: &str,
        shutdown: &CancellationToken,
    ) -> Result<String, QueueError>;

    /// Cheap connectivity probe, used before the worker starts.
    async fn ping(&self) -> Result<(), QueueError>;
}
