//! Audit event structure

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One audited domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    /// When the event was audited
    pub timestamp: DateTime<Utc>,

    /// Channel the event arrived on (e.g., "contact.created")
    pub event_type: String,

    /// Payload exactly as delivered by the bus
    pub payload: Value,
}

impl AuditEvent {
    /// Create an audit event stamped with a fresh id and the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use fanout_audit::AuditEvent;
    /// use serde_json::json;
    ///
    /// let event = AuditEvent::new("contact.deleted", json!({ "id": 7 }));
    /// assert_eq!(event.event_type, "contact.deleted");
    /// ```
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.into(),
            payload,
        }
    }

    /// Human-readable audit line:
    /// `[AUDIT] Event: <type> | Payload: <json> | Timestamp: <rfc3339>`
    pub fn log_line(&self) -> String {
        format!(
            "[AUDIT] Event: {} | Payload: {} | Timestamp: {}",
            self.event_type,
            self.payload,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_events_get_distinct_ids() {
        let a = AuditEvent::new("contact.created", json!({}));
        let b = AuditEvent::new("contact.created", json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_log_line_format() {
        let mut event = AuditEvent::new("contact.updated", json!({ "id": 3, "changes": { "phone": null } }));
        event.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        assert_eq!(
            event.log_line(),
            r#"[AUDIT] Event: contact.updated | Payload: {"changes":{"phone":null},"id":3} | Timestamp: 2024-05-01T12:30:00.000Z"#
        );
    }

    #[test]
    fn test_json_round_trip() {
        let event = AuditEvent::new("contact.deleted", json!({ "id": 9 }));
        let parsed: AuditEvent = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(parsed, event);
    }
}
