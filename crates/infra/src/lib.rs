//! `athanor-infra` — infrastructure: Postgres stores, the Redis-backed
//! task queue, the worker pipeline and configuration loading.

pub mod config;
pub mod db;
pub mod queue;
pub mod tasks;

pub use config::Config;
pub use db::{
    InMemoryStores, PgAuditStore, PgMaterialStore, PgMissionStore, PgTransmutationStore,
    PgUserStore, connect_pool,
};
pub use queue::{InMemoryQueueStore, QueueError, QueueStore, RedisQueueStore};
pub use tasks::{PipelineSettings, TaskContext, TaskQueue};
