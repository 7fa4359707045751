//! Store traits the pipeline and the API consume.
//!
//! Implementations live in the infra crate (Postgres for production,
//! in-memory doubles for tests). All methods return [`DomainResult`];
//! backend failures arrive as `DomainError::Storage`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::{Audit, NewAudit};
use crate::error::DomainResult;
use crate::material::{Material, NewMaterial};
use crate::mission::{Mission, MissionStatus, NewMission};
use crate::transmutation::{NewTransmutation, Transmutation};
use crate::user::{NewUser, User};

#[async_trait]
pub trait TransmutationStore: Send + Sync {
    /// Atomically verify material stock, decrement it and insert the
    /// new row as `PENDING`. Concurrent calls against the same material
    /// serialize; stock never goes negative.
    async fn create_guarded(&self, new: NewTransmutation) -> DomainResult<Transmutation>;

    async fn find(&self, id: i64) -> DomainResult<Option<Transmutation>>;

    async fn list(&self) -> DomainResult<Vec<Transmutation>>;

    /// Rows owned by a single user, newest first.
    async fn list_by_user(&self, user_id: i64) -> DomainResult<Vec<Transmutation>>;

    /// Persist the mutable columns of an existing row.
    async fn save(&self, t: &Transmutation) -> DomainResult<()>;

    async fn delete(&self, id: i64) -> DomainResult<()>;

    /// `PENDING` rows created strictly before `threshold`, for the
    /// verification sweep.
    async fn find_pending_before(
        &self,
        threshold: DateTime<Utc>,
    ) -> DomainResult<Vec<Transmutation>>;
}

#[async_trait]
pub trait MaterialStore: Send + Sync {
    async fn create(&self, new: NewMaterial) -> DomainResult<Material>;
    async fn find(&self, id: i64) -> DomainResult<Option<Material>>;
    async fn list(&self) -> DomainResult<Vec<Material>>;
    async fn save(&self, m: &Material) -> DomainResult<()>;
    async fn delete(&self, id: i64) -> DomainResult<()>;

    /// Materials with quantity strictly below `threshold`.
    async fn find_low_stock(&self, threshold: f64) -> DomainResult<Vec<Material>>;
}

#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn create(&self, new: NewMission) -> DomainResult<Mission>;
    async fn find(&self, id: i64) -> DomainResult<Option<Mission>>;
    async fn list(&self) -> DomainResult<Vec<Mission>>;
    async fn save(&self, m: &Mission) -> DomainResult<()>;
    async fn set_status(&self, id: i64, status: MissionStatus) -> DomainResult<Mission>;
    async fn delete(&self, id: i64) -> DomainResult<()>;

    /// Missions neither completed nor archived, created strictly
    /// before `threshold`.
    async fn find_open_before(&self, threshold: DateTime<Utc>) -> DomainResult<Vec<Mission>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DomainError::EmailTaken` on a duplicate email.
    async fn create(&self, new: NewUser) -> DomainResult<User>;
    async fn find(&self, id: i64) -> DomainResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>>;
    async fn list(&self) -> DomainResult<Vec<User>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create(&self, new: NewAudit) -> DomainResult<Audit>;

    /// Newest first, at most `limit` records.
    async fn list(&self, limit: i64) -> DomainResult<Vec<Audit>>;
}
