//! Materials: the shared stock each transmutation draws from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A persisted material.
///
/// `quantity` never goes below zero; the guarded transmutation create
/// is the only writer allowed to decrement it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub id: i64,
    pub name: String,
    pub rarity: String,
    pub quantity: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    /// Check-and-decrement used by the guarded create. Errors leave the
    /// quantity untouched.
    pub fn consume(&mut self, requested: f64) -> DomainResult<()> {
        if self.quantity < requested {
            return Err(DomainError::InsufficientMaterial {
                available: self.quantity,
                requested,
            });
        }
        self.quantity -= requested;
        Ok(())
    }
}

/// Input for creating a material.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMaterial {
    pub name: String,
    pub rarity: String,
    pub quantity: f64,
}

impl NewMaterial {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("material name must not be empty"));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(DomainError::validation("quantity must be non-negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iron(quantity: f64) -> Material {
        Material {
            id: 1,
            name: "iron".into(),
            rarity: "common".into(),
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn consume_decrements() {
        let mut m = iron(5.0);
        m.consume(2.0).unwrap();
        assert_eq!(m.quantity, 3.0);
    }

    #[test]
    fn consume_rejects_overdraw_without_mutating() {
        let mut m = iron(1.5);
        let err = m.consume(2.0).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientMaterial { available: 1.5, requested: 2.0 }
        );
        assert_eq!(m.quantity, 1.5);
    }

    #[test]
    fn consume_allows_draining_to_zero() {
        let mut m = iron(2.0);
        m.consume(2.0).unwrap();
        assert_eq!(m.quantity, 0.0);
    }
}
