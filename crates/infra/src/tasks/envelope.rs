//! Wire format for queued tasks.
//!
//! Every queue entry is a JSON object `{"type": ..., "payload": ...}`.
//! The `type` string names one of the three task kinds; the payload
//! shape depends on it. Unknown kinds fail to decode and the worker
//! drops them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use athanor_core::NewAudit;

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Task {
    /// Drive one transmutation through its status machine.
    ProcessTransmutation(ProcessTransmutation),
    /// Append a record to the audit trail.
    RegisterAudit(NewAudit),
    /// Run the verification sweep over stale and scarce rows.
    DailyVerification(DailyVerification),
}

impl Task {
    /// Wire name of the kind, used for logging and error audits.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProcessTransmutation(_) => "process_transmutation",
            Self::RegisterAudit(_) => "register_audit",
            Self::DailyVerification(_) => "daily_verification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTransmutation {
    pub transmutation_id: i64,
    /// Email of the user whose request created the transmutation;
    /// the completion audit is attributed to them.
    pub requested_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyVerification {
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn process_transmutation_wire_shape() {
        let task = Task::ProcessTransmutation(ProcessTransmutation {
            transmutation_id: 7,
            requested_by: "ed@example.com".into(),
        });
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "process_transmutation",
                "payload": {"transmutation_id": 7, "requested_by": "ed@example.com"}
            })
        );
    }

    #[test]
    fn register_audit_wire_shape() {
        let task = Task::RegisterAudit(NewAudit {
            action: "material_created".into(),
            entity: "material".into(),
            entity_id: 3,
            user_email: "izumi@example.com".into(),
            details: "added 12.5 units of granite".into(),
        });
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "register_audit");
        assert_eq!(value["payload"]["entity_id"], 3);
        assert_eq!(value["payload"]["user_email"], "izumi@example.com");
    }

    #[test]
    fn kinds_round_trip() {
        let tasks = [
            Task::ProcessTransmutation(ProcessTransmutation {
                transmutation_id: 1,
                requested_by: "a@b".into(),
            }),
            Task::RegisterAudit(NewAudit::system("probe", "system", "x")),
            Task::DailyVerification(DailyVerification { executed_at: Utc::now() }),
        ];
        for task in tasks {
            let raw = serde_json::to_string(&task).unwrap();
            let back: Task = serde_json::from_str(&raw).unwrap();
            assert_eq!(back, task);
            assert!(raw.contains(task.kind()));
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let raw = r#"{"type":"mystery_task","payload":{}}"#;
        assert!(serde_json::from_str::<Task>(raw).is_err());
    }

    #[test]
    fn missing_payload_is_rejected() {
        let raw = r#"{"type":"process_transmutation"}"#;
        assert!(serde_json::from_str::<Task>(raw).is_err());
    }
}
