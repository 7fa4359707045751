//! `athanor-core` — the domain vocabulary of the workshop.
//!
//! This crate contains **pure domain** types (no infrastructure
//! concerns): the entities, the transmutation status machine, the error
//! taxonomy and the store traits everything else is written against.

pub mod audit;
pub mod error;
pub mod material;
pub mod mission;
pub mod store;
pub mod transmutation;
pub mod user;

pub use audit::{Audit, NewAudit, SYSTEM_EMAIL, SYSTEM_ENTITY, actions, entities};
pub use error::{DomainError, DomainResult};
pub use material::{Material, NewMaterial};
pub use mission::{Mission, MissionStatus, NewMission};
pub use store::{AuditStore, MaterialStore, MissionStore, TransmutationStore, UserStore};
pub use transmutation::{NewTransmutation, Transmutation, TransmutationStatus};
pub use user::{NewUser, Role, User};
