//! Users: alchemists and the supervisors who oversee them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Alchemist,
    Supervisor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alchemist => "alchemist",
            Self::Supervisor => "supervisor",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "alchemist" => Ok(Self::Alchemist),
            "supervisor" => Ok(Self::Supervisor),
            other => Err(DomainError::validation(format!("unknown role: {other}"))),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted user. The password hash never serializes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub specialty: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registration; the hash is produced by the API layer
/// before the store ever sees the record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub specialty: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_never_serializes() {
        let u = User {
            id: 9,
            name: "Edward".into(),
            specialty: "metallurgy".into(),
            email: "ed@example.com".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            role: Role::Alchemist,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&u).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"role\":\"alchemist\""));
    }

    #[test]
    fn role_round_trips() {
        assert_eq!(Role::parse("supervisor").unwrap(), Role::Supervisor);
        assert_eq!(Role::parse("alchemist").unwrap(), Role::Alchemist);
        assert!(Role::parse("admin").is_err());
    }
}
