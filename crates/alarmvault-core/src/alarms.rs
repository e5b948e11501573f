use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite `[listId, elementId]` identity as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdTuple(pub String, pub String);

impl IdTuple {
    pub fn new(list_id: impl Into<String>, element_id: impl Into<String>) -> Self {
        Self(list_id.into(), element_id.into())
    }

    pub fn list_id(&self) -> &str {
        &self.0
    }

    /// Element part of the tuple; for push identifiers this is the id that
    /// session keys are stored under.
    pub fn element_id(&self) -> &str {
        &self.1
    }
}

/// A candidate offered for session key resolution: the session key encrypted
/// for a peer plus the push identifier it was delivered to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSessionKey {
    /// Still-encrypted peer session key (base64). Opaque to this workspace.
    pub push_identifier_session_enc_session_key: String,
    pub push_identifier: IdTuple,
}

impl NotificationSessionKey {
    pub fn new(peer_enc_session_key: impl Into<String>, push_identifier: IdTuple) -> Self {
        Self {
            push_identifier_session_enc_session_key: peer_enc_session_key.into(),
            push_identifier,
        }
    }

    pub fn push_identifier_id(&self) -> &str {
        self.push_identifier.element_id()
    }
}

/// Outcome of a successful session key resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedSessionKey {
    /// Decrypted push identifier session key (base64).
    #[serde(rename = "piSk")]
    pub session_key: String,
    /// The matching candidate's peer key, passed through untouched.
    #[serde(rename = "piSkEncSk")]
    pub peer_enc_session_key: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmInfo {
    pub alarm_identifier: String,
    /// Relative trigger such as `5M`, `1H` or `1D`.
    pub trigger: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepeatRule {
    pub frequency: String,
    pub interval: u32,
    pub time_zone: String,
    pub end_value: Option<DateTime<Utc>>,
}

/// Alarm record delivered by push and kept across restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmNotification {
    pub operation: Operation,
    pub summary: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    pub alarm_info: AlarmInfo,
    #[serde(default)]
    pub repeat_rule: Option<RepeatRule>,
    #[serde(default)]
    pub notification_session_keys: Vec<NotificationSessionKey>,
    pub user: String,
}

/// In-memory scheduling bookkeeping for one alarm. `H` is whatever live
/// timer handle the scheduler uses; only `an` survives a restart.
#[derive(Debug)]
pub struct ScheduledAlarm<H> {
    pub timeouts: Vec<H>,
    pub an: AlarmNotification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_tuple_serializes_as_array() {
        let id = IdTuple::new("list1", "pid1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, r#"["list1","pid1"]"#);
        assert_eq!(id.list_id(), "list1");
        assert_eq!(id.element_id(), "pid1");
    }

    #[test]
    fn candidate_uses_wire_field_names() {
        let json = r#"{
            "pushIdentifierSessionEncSessionKey": "peerEnc",
            "pushIdentifier": ["list1", "pid1"]
        }"#;
        let candidate: NotificationSessionKey = serde_json::from_str(json).expect("parse");
        assert_eq!(candidate.push_identifier_session_enc_session_key, "peerEnc");
        assert_eq!(candidate.push_identifier_id(), "pid1");
    }

    #[test]
    fn resolved_key_uses_short_field_names() {
        let resolved = ResolvedSessionKey {
            session_key: "a2V5MQ==".into(),
            peer_enc_session_key: "peerEnc".into(),
        };
        let value = serde_json::to_value(&resolved).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"piSk": "a2V5MQ==", "piSkEncSk": "peerEnc"})
        );
    }

    #[test]
    fn alarm_notification_parses_without_optional_fields() {
        let json = r#"{
            "operation": "create",
            "summary": "Standup",
            "eventStart": "2026-10-20T09:00:00Z",
            "eventEnd": "2026-10-20T09:15:00Z",
            "alarmInfo": {"alarmIdentifier": "alarm-1", "trigger": "5M"},
            "user": "user-1"
        }"#;
        let an: AlarmNotification = serde_json::from_str(json).expect("parse");
        assert_eq!(an.operation, Operation::Create);
        assert!(an.repeat_rule.is_none());
        assert!(an.notification_session_keys.is_empty());
        assert_eq!(an.alarm_info.trigger, "5M");
    }
}
