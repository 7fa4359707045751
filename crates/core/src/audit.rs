//! Audit trail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit action names. Kept as constants so call sites cannot drift.
pub mod actions {
    pub const TRANSMUTATION_PROCESSED: &str = "transmutation_processed";
    pub const TRANSMUTATION_CREATED: &str = "transmutation_created";
    pub const TRANSMUTATION_UPDATED: &str = "transmutation_updated";
    pub const TRANSMUTATION_DELETED: &str = "transmutation_deleted";
    pub const MISSION_CREATED: &str = "mission_created";
    pub const MISSION_UPDATED: &str = "mission_updated";
    pub const MISSION_STATUS_CHANGED: &str = "mission_status_changed";
    pub const MISSION_CLOSED: &str = "mission_closed";
    pub const MISSION_DELETED: &str = "mission_deleted";
    pub const MATERIAL_CREATED: &str = "material_created";
    pub const MATERIAL_UPDATED: &str = "material_updated";
    pub const MATERIAL_DELETED: &str = "material_deleted";
    pub const USER_REGISTERED: &str = "user_registered";
    pub const USER_LOGIN: &str = "user_login";
    pub const DAILY_VERIFICATION: &str = "daily_verification";
    pub const WORKER_ERROR: &str = "worker_error";
    pub const ASYNC_ERROR: &str = "async_error";
}

/// Entity names audits refer to.
pub mod entities {
    pub const TRANSMUTATION: &str = "transmutation";
    pub const MISSION: &str = "mission";
    pub const MATERIAL: &str = "material";
    pub const USER: &str = "user";
}

/// Attribution for records the system writes about itself.
pub const SYSTEM_EMAIL: &str = "system";
/// Entity tag for system-wide records such as the verification sweep.
pub const SYSTEM_ENTITY: &str = "system";

/// A persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Audit {
    pub id: i64,
    pub action: String,
    pub entity: String,
    pub entity_id: i64,
    pub user_email: String,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Input for appending to the trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAudit {
    pub action: String,
    pub entity: String,
    pub entity_id: i64,
    pub user_email: String,
    pub details: String,
}

impl NewAudit {
    /// Record attributed to the system itself rather than a caller.
    pub fn system(action: &str, entity: &str, details: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            entity: entity.to_string(),
            entity_id: 0,
            user_email: SYSTEM_EMAIL.to_string(),
            details: details.into(),
        }
    }
}
