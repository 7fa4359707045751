//! Transmutations: the unit of background work.
//!
//! A transmutation is a request to transform a material through a
//! formula, consuming a quantity of that material. Rows are created
//! `PENDING` by the guarded store and driven through the status machine
//! by the worker.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Lifecycle of a transmutation.
///
/// Admitted transitions: `Pending -> Processing`,
/// `Processing -> Completed` and `Processing -> Failed`. Both
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmutationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransmutationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(DomainError::validation(format!(
                "unknown transmutation status: {other}"
            ))),
        }
    }

    /// Whether the machine admits `self -> next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl core::fmt::Display for TransmutationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted transmutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transmutation {
    pub id: i64,
    pub user_id: i64,
    pub material_id: i64,
    pub formula: String,
    pub quantity: f64,
    pub status: TransmutationStatus,
    pub result: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transmutation {
    /// Move `Pending -> Processing` and stamp the start milestone.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(TransmutationStatus::Processing)?;
        self.result = format!(
            "Processing started at {}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        self.updated_at = now;
        Ok(())
    }

    /// Move `Processing -> Completed` and stamp the completion milestone.
    pub fn complete(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(TransmutationStatus::Completed)?;
        self.result = format!(
            "Completed at {}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        self.updated_at = now;
        Ok(())
    }

    /// Move `Processing -> Failed`, recording why the completion could
    /// not be persisted.
    pub fn fail_completion(&mut self, cause: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(TransmutationStatus::Failed)?;
        self.result = format!("Failed to persist completion: {cause}");
        self.updated_at = now;
        Ok(())
    }

    fn transition(&mut self, next: TransmutationStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::validation(format!(
                "illegal status transition {} -> {}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Input for the guarded create.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTransmutation {
    pub user_id: i64,
    pub material_id: i64,
    pub formula: String,
    pub quantity: f64,
}

impl NewTransmutation {
    /// Reject requests no store should ever see. A blank formula is
    /// allowed and recorded as such.
    pub fn validate(&self) -> DomainResult<()> {
        if self.user_id <= 0 {
            return Err(DomainError::validation("invalid user"));
        }
        if self.material_id <= 0 {
            return Err(DomainError::validation("material is required"));
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        Ok(())
    }
}
