//! What each task kind does once the worker delivers it.
//!
//! Handlers run strictly one at a time on the worker loop, so they need
//! no internal locking. Business failures abort the current task only;
//! the worker records them in the audit trail and moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use athanor_core::{
    AuditStore, DomainError, DomainResult, MaterialStore, MissionStore, NewAudit, SYSTEM_ENTITY,
    Transmutation, TransmutationStatus, TransmutationStore, actions, entities,
};
use athanor_events::{EventHub, event_types};

use super::envelope::{DailyVerification, ProcessTransmutation};
use crate::config::Config;

/// Tunables the handlers read. Defaults mirror the configuration
/// fallbacks: a 3 second unit of work, a 24 hour staleness threshold
/// and 5 units of stock.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Duration of the simulated heavy work inside the transmutation
    /// handler. Tests shrink this to milliseconds.
    pub work_delay: Duration,
    /// Rows older than now minus this age count as stale in the sweep.
    pub pending_age: chrono::Duration,
    /// Materials below this quantity count as scarce in the sweep.
    pub low_stock_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_delay: Duration::from_secs(3),
            pending_age: chrono::Duration::hours(24),
            low_stock_threshold: 5.0,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pending_age: config.pending_age,
            low_stock_threshold: config.low_stock_threshold,
            ..Self::default()
        }
    }
}

/// Everything the handlers touch: the stores, the broadcast hub and
/// the tunables. One instance is shared by the worker for the life of
/// the process.
pub struct TaskContext {
    pub transmutations: Arc<dyn TransmutationStore>,
    pub materials: Arc<dyn MaterialStore>,
    pub missions: Arc<dyn MissionStore>,
    pub audits: Arc<dyn AuditStore>,
    pub hub: Arc<EventHub>,
    pub settings: PipelineSettings,
}

impl TaskContext {
    /// Drive one transmutation `PENDING -> PROCESSING -> COMPLETED`.
    ///
    /// Each status change is persisted and broadcast as
    /// `transmutation.updated` before the next step. Re-delivery for an
    /// already completed row is a silent no-op, so a duplicate queue
    /// entry cannot double-complete or double-audit. If persisting the
    /// completion fails, the row is marked `FAILED` best-effort, that
    /// state is broadcast, and the original error propagates to the
    /// worker.
    pub(crate) async fn process_transmutation(
        &self,
        payload: ProcessTransmutation,
    ) -> DomainResult<()> {
        let Some(mut transmutation) = self.transmutations.find(payload.transmutation_id).await?
        else {
            return Err(DomainError::TransmutationNotFound);
        };
        if transmutation.status == TransmutationStatus::Completed {
            debug!(
                transmutation_id = transmutation.id,
                "already completed, skipping re-delivery"
            );
            return Ok(());
        }

        transmutation.begin_processing(Utc::now())?;
        self.transmutations.save(&transmutation).await?;
        self.broadcast_transmutation(&transmutation);

        tokio::time::sleep(self.settings.work_delay).await;

        let mut completed = transmutation.clone();
        completed.complete(Utc::now())?;
        if let Err(save_error) = self.transmutations.save(&completed).await {
            transmutation.fail_completion(&save_error.to_string(), Utc::now())?;
            if let Err(mark_error) = self.transmutations.save(&transmutation).await {
                warn!(
                    transmutation_id = transmutation.id,
                    error = %mark_error,
                    "failed to mark transmutation as failed"
                );
            }
            self.broadcast_transmutation(&transmutation);
            return Err(save_error);
        }
        self.broadcast_transmutation(&completed);

        self.register_audit(NewAudit {
            action: actions::TRANSMUTATION_PROCESSED.to_string(),
            entity: entities::TRANSMUTATION.to_string(),
            entity_id: completed.id,
            user_email: payload.requested_by,
            details: completed.result,
        })
        .await
    }

    /// Persist one audit record and broadcast it as `audit.created`.
    pub(crate) async fn register_audit(&self, audit: NewAudit) -> DomainResult<()> {
        let saved = self.audits.create(audit).await?;
        self.hub.broadcast(event_types::AUDIT_CREATED, &saved);
        Ok(())
    }

    /// Sweep for stale and scarce rows and write one summary audit.
    ///
    /// Three independent queries: pending transmutations older than the
    /// threshold, open missions older than the threshold, and materials
    /// under the low-stock quantity. Each non-empty result contributes
    /// one clause; a failing query aborts the sweep so no partial
    /// summary is ever written.
    pub(crate) async fn run_verification_sweep(
        &self,
        payload: DailyVerification,
    ) -> DomainResult<()> {
        debug!(executed_at = %payload.executed_at, "running verification sweep");
        let threshold = Utc::now() - self.settings.pending_age;
        let mut clauses = Vec::new();

        let pending = self.transmutations.find_pending_before(threshold).await?;
        if !pending.is_empty() {
            clauses.push(format!("{} transmutations pending", pending.len()));
        }

        let open = self.missions.find_open_before(threshold).await?;
        if !open.is_empty() {
            clauses.push(format!("{} missions still open", open.len()));
        }

        let scarce = self
            .materials
            .find_low_stock(self.settings.low_stock_threshold)
            .await?;
        if !scarce.is_empty() {
            clauses.push(format!("{} materials at critical stock", scarce.len()));
        }

        if clauses.is_empty() {
            clauses.push("No critical findings".to_string());
        }

        self.register_audit(NewAudit::system(
            actions::DAILY_VERIFICATION,
            SYSTEM_ENTITY,
            clauses.join("; "),
        ))
        .await
    }

    fn broadcast_transmutation(&self, transmutation: &Transmutation) {
        self.hub
            .broadcast(event_types::TRANSMUTATION_UPDATED, transmutation);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context_with, pending_transmutation};
    use super::*;
    use crate::db::InMemoryStores;

    use athanor_core::{Material, Mission, MissionStatus, SYSTEM_EMAIL};
    use serde_json::Value;

    fn fast_settings() -> PipelineSettings {
        PipelineSettings {
            work_delay: Duration::from_millis(5),
            ..PipelineSettings::default()
        }
    }

    fn drain(subscriber: &athanor_events::Subscriber) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(raw) = subscriber.try_recv() {
            frames.push(serde_json::from_str(&raw).unwrap());
        }
        frames
    }

    fn old_material(id: i64, quantity: f64) -> Material {
        let now = Utc::now();
        Material {
            id,
            name: format!("material-{id}"),
            rarity: "common".into(),
            quantity,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn processes_pending_transmutation_to_completion() {
        let stores = InMemoryStores::new();
        stores.insert_transmutation(pending_transmutation(7)).await;
        let (context, hub) = context_with(&stores, fast_settings());
        let subscriber = hub.subscribe();

        context
            .process_transmutation(ProcessTransmutation {
                transmutation_id: 7,
                requested_by: "ed@example.com".into(),
            })
            .await
            .unwrap();

        let stored = TransmutationStore::find(&stores, 7).await.unwrap().unwrap();
        assert_eq!(stored.status, TransmutationStatus::Completed);
        assert!(stored.result.starts_with("Completed at "));

        let frames = drain(&subscriber);
        let updates: Vec<_> = frames
            .iter()
            .filter(|f| f["type"] == "transmutation.updated")
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0]["payload"]["status"], "PROCESSING");
        assert_eq!(updates[1]["payload"]["status"], "COMPLETED");

        let audits: Vec<_> = frames
            .iter()
            .filter(|f| f["type"] == "audit.created")
            .collect();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0]["payload"]["action"], "transmutation_processed");
        assert_eq!(audits[0]["payload"]["user_email"], "ed@example.com");
        assert_eq!(audits[0]["payload"]["details"], stored.result);
    }

    #[tokio::test]
    async fn redelivery_of_completed_transmutation_is_a_noop() {
        let stores = InMemoryStores::new();
        let mut done = pending_transmutation(3);
        done.begin_processing(Utc::now()).unwrap();
        done.complete(Utc::now()).unwrap();
        let result_before = done.result.clone();
        stores.insert_transmutation(done).await;

        let (context, hub) = context_with(&stores, fast_settings());
        let subscriber = hub.subscribe();

        context
            .process_transmutation(ProcessTransmutation {
                transmutation_id: 3,
                requested_by: "ed@example.com".into(),
            })
            .await
            .unwrap();

        let stored = TransmutationStore::find(&stores, 3).await.unwrap().unwrap();
        assert_eq!(stored.status, TransmutationStatus::Completed);
        assert_eq!(stored.result, result_before);
        assert!(drain(&subscriber).is_empty());
        assert_eq!(stores.audit_count().await, 0);
    }

    #[tokio::test]
    async fn missing_transmutation_fails_the_task() {
        let stores = InMemoryStores::new();
        let (context, _hub) = context_with(&stores, fast_settings());

        let err = context
            .process_transmutation(ProcessTransmutation {
                transmutation_id: 99,
                requested_by: "ed@example.com".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::TransmutationNotFound);
    }

    #[tokio::test]
    async fn completion_persist_failure_marks_row_failed() {
        let stores = InMemoryStores::new();
        stores.insert_transmutation(pending_transmutation(5)).await;
        // First save (PROCESSING) succeeds, second (COMPLETED) fails,
        // third (FAILED fallback) succeeds again.
        stores.fail_transmutation_save_at(2);

        let (context, hub) = context_with(&stores, fast_settings());
        let subscriber = hub.subscribe();

        let err = context
            .process_transmutation(ProcessTransmutation {
                transmutation_id: 5,
                requested_by: "ed@example.com".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));

        let stored = TransmutationStore::find(&stores, 5).await.unwrap().unwrap();
        assert_eq!(stored.status, TransmutationStatus::Failed);
        assert!(stored.result.starts_with("Failed to persist completion: "));

        let frames = drain(&subscriber);
        let statuses: Vec<_> = frames
            .iter()
            .filter(|f| f["type"] == "transmutation.updated")
            .map(|f| f["payload"]["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(statuses, ["PROCESSING", "FAILED"]);
        // The completion audit never fires on the failure path.
        assert_eq!(stores.audit_count().await, 0);
    }

    #[tokio::test]
    async fn register_audit_persists_and_broadcasts() {
        let stores = InMemoryStores::new();
        let (context, hub) = context_with(&stores, fast_settings());
        let subscriber = hub.subscribe();

        context
            .register_audit(NewAudit {
                action: "material_created".into(),
                entity: "material".into(),
                entity_id: 11,
                user_email: "izumi@example.com".into(),
                details: "added 4 units".into(),
            })
            .await
            .unwrap();

        assert_eq!(stores.audit_count().await, 1);
        let frames = drain(&subscriber);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "audit.created");
        assert_eq!(frames[0]["payload"]["entity_id"], 11);
    }

    #[tokio::test]
    async fn sweep_reports_only_non_empty_categories() {
        let stores = InMemoryStores::new();
        let stale = Utc::now() - chrono::Duration::hours(48);
        for id in [1, 2] {
            let mut t = pending_transmutation(id);
            t.created_at = stale;
            stores.insert_transmutation(t).await;
        }
        // A recent pending row stays under the threshold and is not counted.
        stores.insert_transmutation(pending_transmutation(3)).await;
        stores.insert_material(old_material(10, 1.5)).await;

        let (context, hub) = context_with(&stores, fast_settings());
        let subscriber = hub.subscribe();

        context
            .run_verification_sweep(DailyVerification { executed_at: Utc::now() })
            .await
            .unwrap();

        let audits = AuditStore::list(&stores, 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        let audit = &audits[0];
        assert_eq!(audit.action, "daily_verification");
        assert_eq!(audit.entity, SYSTEM_ENTITY);
        assert_eq!(audit.user_email, SYSTEM_EMAIL);
        assert_eq!(
            audit.details,
            "2 transmutations pending; 1 materials at critical stock"
        );

        let frames = drain(&subscriber);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "audit.created");
    }

    #[tokio::test]
    async fn sweep_counts_open_missions_past_threshold() {
        let stores = InMemoryStores::new();
        let stale = Utc::now() - chrono::Duration::hours(48);
        let mission = Mission {
            id: 1,
            title: "find the stone".into(),
            description: String::new(),
            difficulty: "A".into(),
            status: MissionStatus::InProgress,
            assigned_to: None,
            created_at: stale,
            updated_at: stale,
        };
        stores.insert_mission(mission).await;

        let (context, _hub) = context_with(&stores, fast_settings());
        context
            .run_verification_sweep(DailyVerification { executed_at: Utc::now() })
            .await
            .unwrap();

        let audits = AuditStore::list(&stores, 10).await.unwrap();
        assert_eq!(audits[0].details, "1 missions still open");
    }

    #[tokio::test]
    async fn sweep_with_nothing_to_report_writes_fixed_marker() {
        let stores = InMemoryStores::new();
        let (context, _hub) = context_with(&stores, fast_settings());

        context
            .run_verification_sweep(DailyVerification { executed_at: Utc::now() })
            .await
            .unwrap();

        let audits = AuditStore::list(&stores, 10).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].details, "No critical findings");
    }

    #[tokio::test]
    async fn sweep_query_failure_writes_no_partial_audit() {
        let stores = InMemoryStores::new();
        stores.insert_material(old_material(1, 0.5)).await;
        stores.fail_pending_queries(1);

        let (context, hub) = context_with(&stores, fast_settings());
        let subscriber = hub.subscribe();

        let err = context
            .run_verification_sweep(DailyVerification { executed_at: Utc::now() })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
        assert_eq!(stores.audit_count().await, 0);
        assert!(drain(&subscriber).is_empty());
    }
}
