//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures plus the storage failures the stores
/// surface. Each variant is mapped to an HTTP status in exactly one
/// place in the API crate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transmutation not found")]
    TransmutationNotFound,

    #[error("material not found")]
    MaterialNotFound,

    #[error("mission not found")]
    MissionNotFound,

    #[error("user not found")]
    UserNotFound,

    /// The guarded create found less material than the request consumes.
    #[error("insufficient material: requested {requested}, available {available}")]
    InsufficientMaterial { available: f64, requested: f64 },

    /// Registration with an email that already has an account.
    #[error("email already registered")]
    EmailTaken,

    /// Login with an unknown email or a wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Underlying store failure (connection, constraint, IO).
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// True for the `*NotFound` family, whatever the entity.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TransmutationNotFound
                | Self::MaterialNotFound
                | Self::MissionNotFound
                | Self::UserNotFound
        )
    }
}
