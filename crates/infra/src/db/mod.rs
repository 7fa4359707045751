//! Persistence for the alchemy workshop.
//!
//! [`postgres`] carries the production stores, one per aggregate, all
//! sharing a [`sqlx::PgPool`]. [`in_memory`] carries the doubles the
//! task pipeline tests run against. Both sides implement the store
//! traits from `athanor_core`, so everything above this module is
//! storage-agnostic.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStores;
pub use postgres::{
    PgAuditStore, PgMaterialStore, PgMissionStore, PgTransmutationStore, PgUserStore,
    connect_pool,
};
