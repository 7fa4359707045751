//! The wire shape every broadcast and SSE frame carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type names published by the system.
pub mod event_types {
    pub const TRANSMUTATION_UPDATED: &str = "transmutation.updated";
    pub const TRANSMUTATION_DELETED: &str = "transmutation.deleted";
    pub const AUDIT_CREATED: &str = "audit.created";
    /// Per-session greeting frame, sent once at subscribe time.
    pub const CONNECTION: &str = "connection";
}

/// Envelope for a broadcast event.
///
/// Serialized exactly once per broadcast; every subscriber receives the
/// same bytes. `timestamp` is RFC 3339 on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_type_payload_timestamp() {
        let envelope = EventEnvelope::new(
            event_types::AUDIT_CREATED,
            serde_json::json!({"action": "user_login"}),
        );
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 3);
        assert_eq!(obj["type"], "audit.created");
        assert_eq!(obj["payload"]["action"], "user_login");
        // RFC 3339 parses back.
        let raw = obj["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(raw).is_ok());
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = EventEnvelope::new("transmutation.updated", serde_json::json!({"id": 7}));
        let back: EventEnvelope =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();
        assert_eq!(back, envelope);
    }
}
