//! Postgres-backed stores.
//!
//! One store per aggregate, each a thin wrapper over a shared
//! [`PgPool`]. Schema lives in `migrations/`; statuses and roles are
//! stored as text and parsed back through the domain enums, so an
//! unknown value in a row surfaces as a validation error instead of a
//! silent default.
//!
//! The only multi-statement write is [`PgTransmutationStore::create_guarded`]:
//! it locks the material row with `SELECT ... FOR UPDATE`, checks and
//! decrements the stock and inserts the `PENDING` transmutation inside
//! a single transaction, so concurrent requests against the same
//! material serialize and stock never goes negative.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use athanor_core::{
    Audit, AuditStore, DomainError, DomainResult, Material, MaterialStore, Mission,
    MissionStatus, MissionStore, NewAudit, NewMaterial, NewMission, NewTransmutation, NewUser,
    Role, Transmutation, TransmutationStatus, TransmutationStore, User, UserStore,
};
use async_trait::async_trait;

/// Open a connection pool sized for one API process plus the worker.
pub async fn connect_pool(database_url: &str) -> anyhow::Result<PgPool> {
    use anyhow::Context;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("failed to connect to postgres")?;
    Ok(pool)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            DomainError::storage(format!("{operation}: database error: {db_err}"))
        }
        sqlx::Error::PoolClosed => {
            DomainError::storage(format!("{operation}: connection pool closed"))
        }
        sqlx::Error::PoolTimedOut => {
            DomainError::storage(format!("{operation}: timed out acquiring connection"))
        }
        other => DomainError::storage(format!("{operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct TransmutationRow {
    id: i64,
    user_id: i64,
    material_id: i64,
    formula: String,
    quantity: f64,
    status: String,
    result: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransmutationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            material_id: row.try_get("material_id")?,
            formula: row.try_get("formula")?,
            quantity: row.try_get("quantity")?,
            status: row.try_get("status")?,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<TransmutationRow> for Transmutation {
    type Error = DomainError;

    fn try_from(row: TransmutationRow) -> DomainResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            material_id: row.material_id,
            formula: row.formula,
            quantity: row.quantity,
            status: TransmutationStatus::parse(&row.status)?,
            result: row.result,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct MaterialRow {
    id: i64,
    name: String,
    rarity: String,
    quantity: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MaterialRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            rarity: row.try_get("rarity")?,
            quantity: row.try_get("quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            rarity: row.rarity,
            quantity: row.quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug)]
struct MissionRow {
    id: i64,
    title: String,
    description: String,
    difficulty: String,
    status: String,
    assigned_to: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MissionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            difficulty: row.try_get("difficulty")?,
            status: row.try_get("status")?,
            assigned_to: row.try_get("assigned_to")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<MissionRow> for Mission {
    type Error = DomainError;

    fn try_from(row: MissionRow) -> DomainResult<Self> {
        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            difficulty: row.difficulty,
            status: MissionStatus::parse(&row.status)?,
            assigned_to: row.assigned_to,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct UserRow {
    id: i64,
    name: String,
    specialty: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            specialty: row.try_get("specialty")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: row.try_get("role")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = DomainError;

    fn try_from(row: UserRow) -> DomainResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            specialty: row.specialty,
            email: row.email,
            password_hash: row.password_hash,
            role: Role::parse(&row.role)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct AuditRow {
    id: i64,
    action: String,
    entity: String,
    entity_id: i64,
    user_email: String,
    details: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AuditRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            action: row.try_get("action")?,
            entity: row.try_get("entity")?,
            entity_id: row.try_get("entity_id")?,
            user_email: row.try_get("user_email")?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<AuditRow> for Audit {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            action: row.action,
            entity: row.entity,
            entity_id: row.entity_id,
            user_email: row.user_email,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Transmutations
// ---------------------------------------------------------------------------

const TRANSMUTATION_COLUMNS: &str =
    "id, user_id, material_id, formula, quantity, status, result, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgTransmutationStore {
    pool: PgPool,
}

impl PgTransmutationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransmutationStore for PgTransmutationStore {
    #[instrument(
        skip(self, new),
        fields(material_id = new.material_id, quantity = new.quantity),
        err
    )]
    async fn create_guarded(&self, new: NewTransmutation) -> DomainResult<Transmutation> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin transmutation create", e))?;

        let material_row = sqlx::query(
            r#"
            SELECT id, name, rarity, quantity, created_at, updated_at
            FROM materials
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(new.material_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock material", e))?;

        let Some(material_row) = material_row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback transmutation create", e))?;
            return Err(DomainError::MaterialNotFound);
        };

        let mut material = Material::from(
            MaterialRow::from_row(&material_row)
                .map_err(|e| map_sqlx_error("decode material", e))?,
        );

        if let Err(guard_err) = material.consume(new.quantity) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback transmutation create", e))?;
            return Err(guard_err);
        }

        sqlx::query("UPDATE materials SET quantity = $1, updated_at = now() WHERE id = $2")
            .bind(material.quantity)
            .bind(material.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("decrement material", e))?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO transmutations (user_id, material_id, formula, quantity, status, result)
            VALUES ($1, $2, $3, $4, $5, '')
            RETURNING {TRANSMUTATION_COLUMNS}
            "#,
        ))
        .bind(new.user_id)
        .bind(new.material_id)
        .bind(&new.formula)
        .bind(new.quantity)
        .bind(TransmutationStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert transmutation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit transmutation create", e))?;

        TransmutationRow::from_row(&inserted)
            .map_err(|e| map_sqlx_error("decode transmutation", e))?
            .try_into()
    }

    async fn find(&self, id: i64) -> DomainResult<Option<Transmutation>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSMUTATION_COLUMNS} FROM transmutations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find transmutation", e))?;

        match row {
            Some(row) => {
                let row = TransmutationRow::from_row(&row)
                    .map_err(|e| map_sqlx_error("decode transmutation", e))?;
                Ok(Some(row.try_into()?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> DomainResult<Vec<Transmutation>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSMUTATION_COLUMNS} FROM transmutations ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list transmutations", e))?;

        rows.iter()
            .map(|row| {
                TransmutationRow::from_row(row)
                    .map_err(|e| map_sqlx_error("decode transmutation", e))?
                    .try_into()
            })
            .collect()
    }

    async fn list_by_user(&self, user_id: i64) -> DomainResult<Vec<Transmutation>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSMUTATION_COLUMNS} FROM transmutations WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list transmutations by user", e))?;

        rows.iter()
            .map(|row| {
                TransmutationRow::from_row(row)
                    .map_err(|e| map_sqlx_error("decode transmutation", e))?
                    .try_into()
            })
            .collect()
    }

    #[instrument(skip(self, t), fields(transmutation_id = t.id, status = %t.status), err)]
    async fn save(&self, t: &Transmutation) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transmutations
            SET formula = $1, quantity = $2, status = $3, result = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&t.formula)
        .bind(t.quantity)
        .bind(t.status.as_str())
        .bind(&t.result)
        .bind(t.updated_at)
        .bind(t.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save transmutation", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TransmutationNotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM transmutations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete transmutation", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TransmutationNotFound);
        }
        Ok(())
    }

    async fn find_pending_before(
        &self,
        threshold: DateTime<Utc>,
    ) -> DomainResult<Vec<Transmutation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSMUTATION_COLUMNS}
            FROM transmutations
            WHERE status = $1 AND created_at < $2
            ORDER BY created_at ASC
            "#,
        ))
        .bind(TransmutationStatus::Pending.as_str())
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find pending transmutations", e))?;

        rows.iter()
            .map(|row| {
                TransmutationRow::from_row(row)
                    .map_err(|e| map_sqlx_error("decode transmutation", e))?
                    .try_into()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Materials
// ---------------------------------------------------------------------------

const MATERIAL_COLUMNS: &str = "id, name, rarity, quantity, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgMaterialStore {
    pool: PgPool,
}

impl PgMaterialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MaterialStore for PgMaterialStore {
    #[instrument(skip(self, new), fields(name = %new.name), err)]
    async fn create(&self, new: NewMaterial) -> DomainResult<Material> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO materials (name, rarity, quantity)
            VALUES ($1, $2, $3)
            RETURNING {MATERIAL_COLUMNS}
            "#,
        ))
        .bind(&new.name)
        .bind(&new.rarity)
        .bind(new.quantity)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert material", e))?;

        let row = MaterialRow::from_row(&row).map_err(|e| map_sqlx_error("decode material", e))?;
        Ok(row.into())
    }

    async fn find(&self, id: i64) -> DomainResult<Option<Material>> {
        let row = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find material", e))?;

        match row {
            Some(row) => {
                let row =
                    MaterialRow::from_row(&row).map_err(|e| map_sqlx_error("decode material", e))?;
                Ok(Some(row.into()))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> DomainResult<Vec<Material>> {
        let rows = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list materials", e))?;

        rows.iter()
            .map(|row| {
                let row =
                    MaterialRow::from_row(row).map_err(|e| map_sqlx_error("decode material", e))?;
                Ok(row.into())
            })
            .collect()
    }

    async fn save(&self, m: &Material) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE materials
            SET name = $1, rarity = $2, quantity = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(&m.name)
        .bind(&m.rarity)
        .bind(m.quantity)
        .bind(m.updated_at)
        .bind(m.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save material", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MaterialNotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete material", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MaterialNotFound);
        }
        Ok(())
    }

    async fn find_low_stock(&self, threshold: f64) -> DomainResult<Vec<Material>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS}
            FROM materials
            WHERE quantity < $1
            ORDER BY quantity ASC
            "#,
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find low stock materials", e))?;

        rows.iter()
            .map(|row| {
                let row =
                    MaterialRow::from_row(row).map_err(|e| map_sqlx_error("decode material", e))?;
                Ok(row.into())
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Missions
// ---------------------------------------------------------------------------

const MISSION_COLUMNS: &str =
    "id, title, description, difficulty, status, assigned_to, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgMissionStore {
    pool: PgPool,
}

impl PgMissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MissionStore for PgMissionStore {
    #[instrument(skip(self, new), fields(title = %new.title), err)]
    async fn create(&self, new: NewMission) -> DomainResult<Mission> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO missions (title, description, difficulty, status, assigned_to)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MISSION_COLUMNS}
            "#,
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.difficulty)
        .bind(MissionStatus::Pending.as_str())
        .bind(new.assigned_to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert mission", e))?;

        MissionRow::from_row(&row)
            .map_err(|e| map_sqlx_error("decode mission", e))?
            .try_into()
    }

    async fn find(&self, id: i64) -> DomainResult<Option<Mission>> {
        let row = sqlx::query(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find mission", e))?;

        match row {
            Some(row) => {
                let row =
                    MissionRow::from_row(&row).map_err(|e| map_sqlx_error("decode mission", e))?;
                Ok(Some(row.try_into()?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> DomainResult<Vec<Mission>> {
        let rows = sqlx::query(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list missions", e))?;

        rows.iter()
            .map(|row| {
                MissionRow::from_row(row)
                    .map_err(|e| map_sqlx_error("decode mission", e))?
                    .try_into()
            })
            .collect()
    }

    async fn save(&self, m: &Mission) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE missions
            SET title = $1, description = $2, difficulty = $3, status = $4,
                assigned_to = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&m.title)
        .bind(&m.description)
        .bind(&m.difficulty)
        .bind(m.status.as_str())
        .bind(m.assigned_to)
        .bind(m.updated_at)
        .bind(m.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save mission", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MissionNotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(mission_id = id, status = %status), err)]
    async fn set_status(&self, id: i64, status: MissionStatus) -> DomainResult<Mission> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE missions
            SET status = $1, updated_at = now()
            WHERE id = $2
            RETURNING {MISSION_COLUMNS}
            "#,
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set mission status", e))?;

        let Some(row) = row else {
            return Err(DomainError::MissionNotFound);
        };
        MissionRow::from_row(&row)
            .map_err(|e| map_sqlx_error("decode mission", e))?
            .try_into()
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM missions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete mission", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MissionNotFound);
        }
        Ok(())
    }

    async fn find_open_before(&self, threshold: DateTime<Utc>) -> DomainResult<Vec<Mission>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MISSION_COLUMNS}
            FROM missions
            WHERE status NOT IN ($1, $2) AND created_at < $3
            ORDER BY created_at ASC
            "#,
        ))
        .bind(MissionStatus::Completed.as_str())
        .bind(MissionStatus::Archived.as_str())
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find open missions", e))?;

        rows.iter()
            .map(|row| {
                MissionRow::from_row(row)
                    .map_err(|e| map_sqlx_error("decode mission", e))?
                    .try_into()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

const USER_COLUMNS: &str =
    "id, name, specialty, email, password_hash, role, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self, new), fields(email = %new.email), err)]
    async fn create(&self, new: NewUser) -> DomainResult<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (name, specialty, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(&new.name)
        .bind(&new.specialty)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::EmailTaken
            } else {
                map_sqlx_error("insert user", e)
            }
        })?;

        UserRow::from_row(&row)
            .map_err(|e| map_sqlx_error("decode user", e))?
            .try_into()
    }

    async fn find(&self, id: i64) -> DomainResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find user", e))?;

        match row {
            Some(row) => {
                let row = UserRow::from_row(&row).map_err(|e| map_sqlx_error("decode user", e))?;
                Ok(Some(row.try_into()?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find user by email", e))?;

        match row {
            Some(row) => {
                let row = UserRow::from_row(&row).map_err(|e| map_sqlx_error("decode user", e))?;
                Ok(Some(row.try_into()?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list users", e))?;

        rows.iter()
            .map(|row| {
                UserRow::from_row(row)
                    .map_err(|e| map_sqlx_error("decode user", e))?
                    .try_into()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Audits
// ---------------------------------------------------------------------------

const AUDIT_COLUMNS: &str = "id, action, entity, entity_id, user_email, details, created_at";

#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    #[instrument(skip(self, new), fields(action = %new.action, entity = %new.entity), err)]
    async fn create(&self, new: NewAudit) -> DomainResult<Audit> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO audits (action, entity, entity_id, user_email, details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {AUDIT_COLUMNS}
            "#,
        ))
        .bind(&new.action)
        .bind(&new.entity)
        .bind(new.entity_id)
        .bind(&new.user_email)
        .bind(&new.details)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert audit", e))?;

        let row = AuditRow::from_row(&row).map_err(|e| map_sqlx_error("decode audit", e))?;
        Ok(row.into())
    }

    async fn list(&self, limit: i64) -> DomainResult<Vec<Audit>> {
        let rows = sqlx::query(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audits ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list audits", e))?;

        rows.iter()
            .map(|row| {
                let row = AuditRow::from_row(row).map_err(|e| map_sqlx_error("decode audit", e))?;
                Ok(row.into())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_in_row_surfaces_as_validation_error() {
        let row = TransmutationRow {
            id: 1,
            user_id: 1,
            material_id: 1,
            formula: "lead->gold".into(),
            quantity: 1.0,
            status: "UNHEARD_OF".into(),
            result: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = Transmutation::try_from(row).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn row_conversions_preserve_fields() {
        let now = Utc::now();
        let row = MissionRow {
            id: 4,
            title: "survey the east wing".into(),
            description: "catalog every array".into(),
            difficulty: "B".into(),
            status: "IN_PROGRESS".into(),
            assigned_to: Some(9),
            created_at: now,
            updated_at: now,
        };
        let mission = Mission::try_from(row).unwrap();
        assert_eq!(mission.status, MissionStatus::InProgress);
        assert_eq!(mission.assigned_to, Some(9));
    }
}
