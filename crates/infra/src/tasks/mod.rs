//! The asynchronous task pipeline.
//!
//! Requests enqueue small JSON tasks ([`envelope::Task`]) instead of
//! doing slow work inline; a single worker ([`worker`]) drains them in
//! FIFO order and runs the handlers ([`handlers`]), which persist
//! through the store traits and notify live listeners through the
//! event hub. [`queue::TaskQueue`] ties the pieces together and owns
//! the lifecycle.

pub mod envelope;
pub mod handlers;
pub mod queue;
mod worker;

pub use envelope::{DailyVerification, ProcessTransmutation, Task};
pub use handlers::{PipelineSettings, TaskContext};
pub use queue::{TASK_QUEUE_KEY, TaskQueue};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;

    use athanor_core::{Transmutation, TransmutationStatus};
    use athanor_events::EventHub;

    use super::handlers::{PipelineSettings, TaskContext};
    use crate::db::InMemoryStores;

    /// A context whose store handles all point at the same in-memory
    /// state.
    pub(crate) fn context_with(
        stores: &InMemoryStores,
        settings: PipelineSettings,
    ) -> (Arc<TaskContext>, Arc<EventHub>) {
        let hub = Arc::new(EventHub::new());
        let context = Arc::new(TaskContext {
            transmutations: Arc::new(stores.clone()),
            materials: Arc::new(stores.clone()),
            missions: Arc::new(stores.clone()),
            audits: Arc::new(stores.clone()),
            hub: Arc::clone(&hub),
            settings,
        });
        (context, hub)
    }

    pub(crate) fn pending_transmutation(id: i64) -> Transmutation {
        let now = Utc::now();
        Transmutation {
            id,
            user_id: 1,
            material_id: 1,
            formula: "lead->gold".into(),
            quantity: 1.0,
            status: TransmutationStatus::Pending,
            result: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
