//! The single consumer loop.
//!
//! One worker drains the list strictly in order, so handler logic never
//! runs concurrently with itself. A popped payload is already gone from
//! the store; whatever happens next, it is delivered at most once.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use athanor_core::{DomainError, DomainResult, NewAudit, actions};
use athanor_events::event_types;

use super::envelope::Task;
use super::queue::TaskQueue;
use crate::queue::QueueError;

/// Fixed pause after a transient queue read failure.
const POP_RETRY_BACKOFF: Duration = Duration::from_secs(2);

impl TaskQueue {
    pub(super) async fn worker_loop(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let raw = match self.store.blocking_pop(&self.queue_key, &self.shutdown).await {
                Ok(raw) => raw,
                Err(QueueError::Cancelled) => break,
                Err(error) => {
                    warn!(%error, "failed to read from task queue");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POP_RETRY_BACKOFF) => {}
                    }
                    continue;
                }
            };

            // A payload that does not decode can never succeed, so it
            // is dropped rather than retried.
            let task: Task = match serde_json::from_str(&raw) {
                Ok(task) => task,
                Err(error) => {
                    error!(%error, "dropping malformed task");
                    continue;
                }
            };

            let kind = task.kind();
            debug!(task = kind, "task dequeued");
            if let Err(error) = self.dispatch(task).await {
                error!(task = kind, %error, "task failed");
                self.record_worker_error(kind, &error).await;
            }
        }
        info!("task worker stopped");
    }

    async fn dispatch(&self, task: Task) -> DomainResult<()> {
        match task {
            Task::ProcessTransmutation(payload) => {
                self.context.process_transmutation(payload).await
            }
            Task::RegisterAudit(audit) => self.context.register_audit(audit).await,
            Task::DailyVerification(payload) => self.context.run_verification_sweep(payload).await,
        }
    }

    /// Leave a `worker_error` record so failures of queue-delivered
    /// work are visible in the trail; if even that write fails, log and
    /// move on.
    async fn record_worker_error(&self, kind: &str, cause: &DomainError) {
        let audit = NewAudit::system(actions::WORKER_ERROR, kind, cause.to_string());
        match self.context.audits.create(audit).await {
            Ok(saved) => self
                .context
                .hub
                .broadcast(event_types::AUDIT_CREATED, &saved),
            Err(error) => warn!(%error, "failed to record worker error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::{context_with, pending_transmutation};
    use super::*;
    use crate::db::InMemoryStores;
    use crate::queue::{InMemoryQueueStore, QueueStore};
    use crate::tasks::handlers::{PipelineSettings, TaskContext};
    use crate::tasks::queue::TASK_QUEUE_KEY;

    use athanor_core::{
        AuditStore, SYSTEM_EMAIL, TransmutationStatus, TransmutationStore,
    };
    use athanor_events::EventHub;

    fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            work_delay: Duration::from_millis(5),
            ..PipelineSettings::default()
        }
    }

    struct Fixture {
        store: Arc<InMemoryQueueStore>,
        stores: InMemoryStores,
        hub: Arc<EventHub>,
        queue: Arc<TaskQueue>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryQueueStore::new());
        let stores = InMemoryStores::new();
        let (context, hub): (Arc<TaskContext>, Arc<EventHub>) =
            context_with(&stores, fast_settings());
        let queue = Arc::new(TaskQueue::new(
            Arc::clone(&store) as Arc<dyn crate::queue::QueueStore>,
            context,
        ));
        Fixture { store, stores, hub, queue }
    }

    async fn wait_for_audits(stores: &InMemoryStores, at_least: usize) {
        for _ in 0..400 {
            if stores.audit_count().await >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker never produced {at_least} audit(s)");
    }

    #[tokio::test]
    async fn dispatches_in_push_order() {
        let f = fixture();
        f.queue.start().await.unwrap();

        for details in ["first", "second", "third"] {
            f.queue
                .enqueue_audit(NewAudit::system("probe", "system", details))
                .await
                .unwrap();
        }
        wait_for_audits(&f.stores, 3).await;
        f.queue.stop();

        let audits = AuditStore::list(&f.stores, 10).await.unwrap();
        let oldest_first: Vec<_> = audits.iter().rev().map(|a| a.details.as_str()).collect();
        assert_eq!(oldest_first, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn end_to_end_transmutation_processing() {
        let f = fixture();
        f.stores.insert_transmutation(pending_transmutation(7)).await;
        let subscriber = f.hub.subscribe();
        f.queue.start().await.unwrap();

        f.queue
            .enqueue_transmutation_processing(7, "ed@example.com")
            .await
            .unwrap();
        wait_for_audits(&f.stores, 1).await;
        f.queue.stop();

        let stored = TransmutationStore::find(&f.stores, 7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransmutationStatus::Completed);

        let audits = AuditStore::list(&f.stores, 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, "transmutation_processed");
        assert_eq!(audits[0].user_email, "ed@example.com");

        let mut update_count = 0;
        while let Ok(raw) = subscriber.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(&raw).unwrap();
            if frame["type"] == "transmutation.updated" {
                update_count += 1;
            }
        }
        assert_eq!(update_count, 2);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_and_the_worker_survives() {
        let f = fixture();
        f.queue.start().await.unwrap();

        f.store
            .push(TASK_QUEUE_KEY, "{definitely not json".to_string())
            .await
            .unwrap();
        f.queue
            .enqueue_audit(NewAudit::system("probe", "system", "still alive"))
            .await
            .unwrap();

        wait_for_audits(&f.stores, 1).await;
        f.queue.stop();

        assert_eq!(f.store.len(TASK_QUEUE_KEY).await, 0);
        let audits = AuditStore::list(&f.stores, 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].details, "still alive");
    }

    #[tokio::test]
    async fn failed_task_leaves_a_worker_error_audit() {
        let f = fixture();
        let subscriber = f.hub.subscribe();
        f.queue.start().await.unwrap();

        // No transmutation 42 exists, so the handler fails.
        f.queue
            .enqueue_transmutation_processing(42, "ed@example.com")
            .await
            .unwrap();
        wait_for_audits(&f.stores, 1).await;
        f.queue.stop();

        let audits = AuditStore::list(&f.stores, 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        let audit = &audits[0];
        assert_eq!(audit.action, "worker_error");
        assert_eq!(audit.entity, "process_transmutation");
        assert_eq!(audit.user_email, SYSTEM_EMAIL);
        assert_eq!(audit.details, DomainError::TransmutationNotFound.to_string());

        let mut saw_audit_frame = false;
        while let Ok(raw) = subscriber.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(&raw).unwrap();
            if frame["type"] == "audit.created" {
                saw_audit_frame = true;
            }
        }
        assert!(saw_audit_frame);
    }

    #[tokio::test]
    async fn worker_survives_a_failing_error_audit() {
        let f = fixture();
        f.stores.fail_audit_creates(1);
        f.queue.start().await.unwrap();

        // The handler fails, then the worker_error write fails too; the
        // worker logs and keeps draining.
        f.queue
            .enqueue_transmutation_processing(42, "ed@example.com")
            .await
            .unwrap();
        f.queue
            .enqueue_audit(NewAudit::system("probe", "system", "still draining"))
            .await
            .unwrap();

        wait_for_audits(&f.stores, 1).await;
        f.queue.stop();

        let audits = AuditStore::list(&f.stores, 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].details, "still draining");
    }

    #[tokio::test]
    async fn transient_pop_failure_backs_off_and_recovers() {
        let f = fixture();
        f.store.inject_pop_errors(1);
        f.queue.start().await.unwrap();

        f.queue
            .enqueue_audit(NewAudit::system("probe", "system", "after backoff"))
            .await
            .unwrap();

        // The first pop fails, the worker sleeps out its fixed backoff
        // and then drains the task.
        for _ in 0..400 {
            if f.stores.audit_count().await >= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        f.queue.stop();

        let audits = AuditStore::list(&f.stores, 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].details, "after backoff");
    }
}
