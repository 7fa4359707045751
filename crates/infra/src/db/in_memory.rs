//! In-memory doubles for every store trait.
//!
//! A single [`InMemoryStores`] value implements all five traits behind
//! one mutex, which makes the guarded transmutation create atomic the
//! same way the Postgres transaction does. Failure injection knobs let
//! pipeline tests exercise the persistence-failure and sweep-abort
//! paths without a database.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use athanor_core::{
    Audit, AuditStore, DomainError, DomainResult, Material, MaterialStore, Mission,
    MissionStatus, MissionStore, NewAudit, NewMaterial, NewMission, NewTransmutation, NewUser,
    Transmutation, TransmutationStatus, TransmutationStore, User, UserStore,
};

#[derive(Default)]
struct State {
    transmutations: HashMap<i64, Transmutation>,
    materials: HashMap<i64, Material>,
    missions: HashMap<i64, Mission>,
    users: HashMap<i64, User>,
    audits: Vec<Audit>,
    last_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn reserve_id(&mut self, id: i64) {
        self.last_id = self.last_id.max(id);
    }
}

/// All five stores over one shared mutex.
#[derive(Clone, Default)]
pub struct InMemoryStores {
    state: Arc<Mutex<State>>,
    transmutation_save_calls: Arc<AtomicUsize>,
    fail_transmutation_save_at: Arc<AtomicUsize>,
    pending_query_errors: Arc<AtomicUsize>,
    audit_create_errors: Arc<AtomicUsize>,
}

fn take_injected_error(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed row, keeping the id counter ahead of it.
    /// Lets tests seed rows with chosen ids and timestamps.
    pub async fn insert_transmutation(&self, t: Transmutation) {
        let mut state = self.state.lock().await;
        state.reserve_id(t.id);
        state.transmutations.insert(t.id, t);
    }

    pub async fn insert_material(&self, m: Material) {
        let mut state = self.state.lock().await;
        state.reserve_id(m.id);
        state.materials.insert(m.id, m);
    }

    pub async fn insert_mission(&self, m: Mission) {
        let mut state = self.state.lock().await;
        state.reserve_id(m.id);
        state.missions.insert(m.id, m);
    }

    pub async fn insert_user(&self, u: User) {
        let mut state = self.state.lock().await;
        state.reserve_id(u.id);
        state.users.insert(u.id, u);
    }

    pub async fn material_quantity(&self, id: i64) -> Option<f64> {
        let state = self.state.lock().await;
        state.materials.get(&id).map(|m| m.quantity)
    }

    pub async fn audit_count(&self) -> usize {
        let state = self.state.lock().await;
        state.audits.len()
    }

    /// Make the nth transmutation save from now (1-based) fail.
    pub fn fail_transmutation_save_at(&self, nth: usize) {
        self.transmutation_save_calls.store(0, Ordering::SeqCst);
        self.fail_transmutation_save_at.store(nth, Ordering::SeqCst);
    }

    /// Make the next `n` pending-transmutation queries fail.
    pub fn fail_pending_queries(&self, n: usize) {
        self.pending_query_errors.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` audit creates fail.
    pub fn fail_audit_creates(&self, n: usize) {
        self.audit_create_errors.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransmutationStore for InMemoryStores {
    async fn create_guarded(&self, new: NewTransmutation) -> DomainResult<Transmutation> {
        let mut state = self.state.lock().await;
        {
            let material = state
                .materials
                .get_mut(&new.material_id)
                .ok_or(DomainError::MaterialNotFound)?;
            material.consume(new.quantity)?;
            material.updated_at = Utc::now();
        }
        let id = state.next_id();
        let now = Utc::now();
        let t = Transmutation {
            id,
            user_id: new.user_id,
            material_id: new.material_id,
            formula: new.formula,
            quantity: new.quantity,
            status: TransmutationStatus::Pending,
            result: String::new(),
            created_at: now,
            updated_at: now,
        };
        state.transmutations.insert(id, t.clone());
        Ok(t)
    }

    async fn find(&self, id: i64) -> DomainResult<Option<Transmutation>> {
        let state = self.state.lock().await;
        Ok(state.transmutations.get(&id).cloned())
    }

    async fn list(&self) -> DomainResult<Vec<Transmutation>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.transmutations.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn list_by_user(&self, user_id: i64) -> DomainResult<Vec<Transmutation>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .transmutations
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn save(&self, t: &Transmutation) -> DomainResult<()> {
        let call = self.transmutation_save_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_at = self.fail_transmutation_save_at.load(Ordering::SeqCst);
        if fail_at != 0 && call == fail_at {
            return Err(DomainError::storage("injected save failure"));
        }
        let mut state = self.state.lock().await;
        match state.transmutations.get_mut(&t.id) {
            Some(slot) => {
                *slot = t.clone();
                Ok(())
            }
            None => Err(DomainError::TransmutationNotFound),
        }
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        state
            .transmutations
            .remove(&id)
            .map(|_| ())
            .ok_or(DomainError::TransmutationNotFound)
    }

    async fn find_pending_before(
        &self,
        threshold: DateTime<Utc>,
    ) -> DomainResult<Vec<Transmutation>> {
        if take_injected_error(&self.pending_query_errors) {
            return Err(DomainError::storage("injected query failure"));
        }
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .transmutations
            .values()
            .filter(|t| t.status == TransmutationStatus::Pending && t.created_at < threshold)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl MaterialStore for InMemoryStores {
    async fn create(&self, new: NewMaterial) -> DomainResult<Material> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let now = Utc::now();
        let m = Material {
            id,
            name: new.name,
            rarity: new.rarity,
            quantity: new.quantity,
            created_at: now,
            updated_at: now,
        };
        state.materials.insert(id, m.clone());
        Ok(m)
    }

    async fn find(&self, id: i64) -> DomainResult<Option<Material>> {
        let state = self.state.lock().await;
        Ok(state.materials.get(&id).cloned())
    }

    async fn list(&self) -> DomainResult<Vec<Material>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.materials.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn save(&self, m: &Material) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        match state.materials.get_mut(&m.id) {
            Some(slot) => {
                *slot = m.clone();
                Ok(())
            }
            None => Err(DomainError::MaterialNotFound),
        }
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        state
            .materials
            .remove(&id)
            .map(|_| ())
            .ok_or(DomainError::MaterialNotFound)
    }

    async fn find_low_stock(&self, threshold: f64) -> DomainResult<Vec<Material>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .materials
            .values()
            .filter(|m| m.quantity < threshold)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.quantity.total_cmp(&b.quantity));
        Ok(rows)
    }
}

#[async_trait]
impl MissionStore for InMemoryStores {
    async fn create(&self, new: NewMission) -> DomainResult<Mission> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let now = Utc::now();
        let m = Mission {
            id,
            title: new.title,
            description: new.description,
            difficulty: new.difficulty,
            status: MissionStatus::Pending,
            assigned_to: new.assigned_to,
            created_at: now,
            updated_at: now,
        };
        state.missions.insert(id, m.clone());
        Ok(m)
    }

    async fn find(&self, id: i64) -> DomainResult<Option<Mission>> {
        let state = self.state.lock().await;
        Ok(state.missions.get(&id).cloned())
    }

    async fn list(&self) -> DomainResult<Vec<Mission>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.missions.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn save(&self, m: &Mission) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        match state.missions.get_mut(&m.id) {
            Some(slot) => {
                *slot = m.clone();
                Ok(())
            }
            None => Err(DomainError::MissionNotFound),
        }
    }

    async fn set_status(&self, id: i64, status: MissionStatus) -> DomainResult<Mission> {
        let mut state = self.state.lock().await;
        let mission = state
            .missions
            .get_mut(&id)
            .ok_or(DomainError::MissionNotFound)?;
        mission.status = status;
        mission.updated_at = Utc::now();
        Ok(mission.clone())
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let mut state = self.state.lock().await;
        state
            .missions
            .remove(&id)
            .map(|_| ())
            .ok_or(DomainError::MissionNotFound)
    }

    async fn find_open_before(&self, threshold: DateTime<Utc>) -> DomainResult<Vec<Mission>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .missions
            .values()
            .filter(|m| m.status.is_open() && m.created_at < threshold)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[async_trait]
impl UserStore for InMemoryStores {
    async fn create(&self, new: NewUser) -> DomainResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == new.email) {
            return Err(DomainError::EmailTaken);
        }
        let id = state.next_id();
        let now = Utc::now();
        let u = User {
            id,
            name: new.name,
            specialty: new.specialty,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, u.clone());
        Ok(u)
    }

    async fn find(&self, id: i64) -> DomainResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn list(&self) -> DomainResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.users.values().cloned().collect();
        rows.sort_by_key(|u| u.id);
        Ok(rows)
    }
}

#[async_trait]
impl AuditStore for InMemoryStores {
    async fn create(&self, new: NewAudit) -> DomainResult<Audit> {
        if take_injected_error(&self.audit_create_errors) {
            return Err(DomainError::storage("injected audit failure"));
        }
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let audit = Audit {
            id,
            action: new.action,
            entity: new.entity,
            entity_id: new.entity_id,
            user_email: new.user_email,
            details: new.details,
            created_at: Utc::now(),
        };
        state.audits.push(audit.clone());
        Ok(audit)
    }

    async fn list(&self, limit: i64) -> DomainResult<Vec<Audit>> {
        let state = self.state.lock().await;
        Ok(state
            .audits
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(id: i64, quantity: f64) -> Material {
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

    fn request(material_id: i64, quantity: f64) -> NewTransmutation {
        NewTransmutation {
            user_id: 1,
            material_id,
            formula: "lead->gold".into(),
            quantity,
        }
    }

    #[tokio::test]
    async fn guarded_create_decrements_and_inserts_pending() {
        let stores = InMemoryStores::new();
        stores.insert_material(material(1, 5.0)).await;

        let t = stores.create_guarded(request(1, 2.0)).await.unwrap();
        assert_eq!(t.status, TransmutationStatus::Pending);
        assert_eq!(stores.material_quantity(1).await, Some(3.0));
        assert!(
            TransmutationStore::find(&stores, t.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn guarded_create_rejects_unknown_material() {
        let stores = InMemoryStores::new();
        let err = stores.create_guarded(request(7, 1.0)).await.unwrap_err();
        assert_eq!(err, DomainError::MaterialNotFound);
        assert!(TransmutationStore::list(&stores).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_guarded_creates_admit_exactly_one_when_stock_covers_one() {
        let stores = InMemoryStores::new();
        stores.insert_material(material(1, 3.0)).await;

        let a = {
            let stores = stores.clone();
            tokio::spawn(async move { stores.create_guarded(request(1, 2.0)).await })
        };
        let b = {
            let stores = stores.clone();
            tokio::spawn(async move { stores.create_guarded(request(1, 2.0)).await })
        };
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let admitted = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(admitted, 1);
        let rejected = outcomes
            .iter()
            .find_map(|r| r.as_ref().err())
            .expect("one request must lose");
        assert!(matches!(rejected, DomainError::InsufficientMaterial { .. }));
        assert_eq!(stores.material_quantity(1).await, Some(1.0));
    }

    #[tokio::test]
    async fn concurrent_guarded_creates_never_overdraw() {
        let stores = InMemoryStores::new();
        stores.insert_material(material(1, 5.0)).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let stores = stores.clone();
            handles.push(tokio::spawn(async move {
                stores.create_guarded(request(1, 1.0)).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(stores.material_quantity(1).await, Some(0.0));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let stores = InMemoryStores::new();
        let new = NewUser {
            name: "Edward".into(),
            specialty: "metallurgy".into(),
            email: "ed@example.com".into(),
            password_hash: "hash".into(),
            role: athanor_core::Role::Alchemist,
        };
        UserStore::create(&stores, new.clone()).await.unwrap();
        let err = UserStore::create(&stores, new).await.unwrap_err();
        assert_eq!(err, DomainError::EmailTaken);
    }

    #[tokio::test]
    async fn seeded_rows_reserve_their_ids() {
        let stores = InMemoryStores::new();
        let now = Utc::now();
        stores
            .insert_user(User {
                id: 40,
                name: "Roy".into(),
                specialty: "flame".into(),
                email: "roy@example.com".into(),
                password_hash: "hash".into(),
                role: athanor_core::Role::Supervisor,
                created_at: now,
                updated_at: now,
            })
            .await;

        let found = stores
            .find_by_email("roy@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, 40);

        let created = UserStore::create(
            &stores,
            NewUser {
                name: "Edward".into(),
                specialty: "metallurgy".into(),
                email: "ed@example.com".into(),
                password_hash: "hash".into(),
                role: athanor_core::Role::Alchemist,
            },
        )
        .await
        .unwrap();
        assert!(created.id > 40);
    }

    #[tokio::test]
    async fn audit_list_is_newest_first_and_limited() {
        let stores = InMemoryStores::new();
        for i in 0..5 {
            AuditStore::create(&stores, NewAudit::system("probe", "system", format!("entry {i}")))
                .await
                .unwrap();
        }
        let recent = AuditStore::list(&stores, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].details, "entry 4");
        assert_eq!(recent[1].details, "entry 3");
    }
}
