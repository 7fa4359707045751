//! Producer side and lifecycle of the task pipeline.
//!
//! All tasks flow through one list in the queue store: producers push
//! at the head, the single worker pops from the tail, which gives FIFO
//! dispatch and at-most-once delivery. [`TaskQueue::start`] verifies
//! connectivity before flipping the started flag and spawning the
//! worker; enqueueing before a successful start fails fast so callers
//! never write into a queue nothing will drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use athanor_core::NewAudit;

use super::envelope::{DailyVerification, ProcessTransmutation, Task};
use super::handlers::TaskContext;
use crate::queue::{QueueError, QueueStore};

/// The list every task flows through.
pub const TASK_QUEUE_KEY: &str = "athanor:tasks";

pub struct TaskQueue {
    pub(super) store: Arc<dyn QueueStore>,
    pub(super) context: Arc<TaskContext>,
    pub(super) queue_key: String,
    started: AtomicBool,
    pub(super) shutdown: CancellationToken,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn QueueStore>, context: Arc<TaskContext>) -> Self {
        Self {
            store,
            context,
            queue_key: TASK_QUEUE_KEY.to_string(),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Verify queue connectivity, then spawn the worker loop. Safe to
    /// call repeatedly; only the first successful call spawns.
    pub async fn start(self: &Arc<Self>) -> Result<(), QueueError> {
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.store.ping().await?;
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.worker_loop().await });
        info!("task worker started");
        Ok(())
    }

    /// Cooperative shutdown: the worker and the scheduler stop at their
    /// next suspension point. Tasks still in the list stay there.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub async fn enqueue_transmutation_processing(
        &self,
        transmutation_id: i64,
        requested_by: impl Into<String>,
    ) -> Result<(), QueueError> {
        self.enqueue(Task::ProcessTransmutation(ProcessTransmutation {
            transmutation_id,
            requested_by: requested_by.into(),
        }))
        .await
    }

    /// Queue an audit write so request handlers never block on it.
    pub async fn enqueue_audit(&self, audit: NewAudit) -> Result<(), QueueError> {
        self.enqueue(Task::RegisterAudit(audit)).await
    }

    pub async fn enqueue_daily_verification(&self) -> Result<(), QueueError> {
        self.enqueue(Task::DailyVerification(DailyVerification {
            executed_at: Utc::now(),
        }))
        .await
    }

    async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(QueueError::NotStarted);
        }
        let raw = serde_json::to_string(&task).map_err(|e| QueueError::Encode(e.to_string()))?;
        self.store.push(&self.queue_key, raw).await
    }

    /// Enqueue one verification sweep immediately, then another per
    /// `interval` tick until shutdown. A no-op unless the queue has
    /// been started.
    pub fn schedule_daily_verification(self: &Arc<Self>, interval: Duration) {
        if !self.started.load(Ordering::SeqCst) {
            warn!("queue not started, skipping verification schedule");
            return;
        }
        info!(
            interval_secs = interval.as_secs(),
            "scheduling periodic verification"
        );
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = queue.enqueue_daily_verification().await {
                warn!(%error, "failed to enqueue verification sweep");
            }
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the enqueue above
            // already covered it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = queue.shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        if let Err(error) = queue.enqueue_daily_verification().await {
                            warn!(%error, "failed to enqueue verification sweep");
                        }
                    }
                }
            }
        });
    }
}
