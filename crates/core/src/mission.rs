//! Missions: assignable objectives tracked alongside transmutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Pending,
    InProgress,
    Completed,
    Archived,
}

impl MissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(DomainError::validation(format!(
                "unknown mission status: {other}"
            ))),
        }
    }

    /// Open missions are the ones the verification sweep counts.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Completed | Self::Archived)
    }
}

impl core::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mission {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub status: MissionStatus,
    pub assigned_to: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a mission; new missions start `PENDING`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMission {
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub assigned_to: Option<i64>,
}

impl NewMission {
    pub fn validate(&self) -> DomainResult<()> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("mission title must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_excludes_completed_and_archived() {
        assert!(MissionStatus::Pending.is_open());
        assert!(MissionStatus::InProgress.is_open());
        assert!(!MissionStatus::Completed.is_open());
        assert!(!MissionStatus::Archived.is_open());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            MissionStatus::Pending,
            MissionStatus::InProgress,
            MissionStatus::Completed,
            MissionStatus::Archived,
        ] {
            assert_eq!(MissionStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(MissionStatus::parse("OPEN").is_err());
    }
}
