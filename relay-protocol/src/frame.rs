//! Duplex-socket frame format: one JSON object per WebSocket text message.
//! `payload` is opaque to the relay itself — only peers interpret it.

use serde::{Deserialize, Serialize};

pub const TYPE_APDU_COMMAND: &str = "apdu.command";
pub const TYPE_APDU_RESPONSE: &str = "apdu.response";
pub const TYPE_CARD_INSERTED: &str = "card.inserted";
pub const TYPE_CARD_REMOVED: &str = "card.removed";
pub const TYPE_HEARTBEAT: &str = "heartbeat";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_ENCRYPTED: &str = "encrypted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl Frame {
    pub fn new(frame_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload,
            id: None,
            seq: None,
            ts: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn heartbeat() -> Self {
        Self::new(TYPE_HEARTBEAT, serde_json::Value::Null)
    }

    /// Build a structured error frame carrying a machine-readable `code`,
    /// preserving the `id` of the frame it's responding to.
    pub fn error(id: Option<&str>, code: &str, message: &str) -> Self {
        let mut frame = Self::new(
            TYPE_ERROR,
            serde_json::json!({ "code": code, "message": message }),
        );
        frame.id = id.map(|s| s.to_string());
        frame
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let frame = Frame::new(TYPE_APDU_COMMAND, serde_json::json!({"hex": "00A4"})).with_id("1");
        let encoded = frame.to_json().unwrap();
        let decoded = Frame::from_json(&encoded).unwrap();
        assert_eq!(decoded.frame_type, TYPE_APDU_COMMAND);
        assert_eq!(decoded.id.as_deref(), Some("1"));
    }

    #[test]
    fn error_frame_preserves_request_id() {
        let frame = Frame::error(Some("42"), "CARDHOST_OFFLINE", "no live cardhost");
        assert_eq!(frame.id.as_deref(), Some("42"));
        assert_eq!(frame.payload["code"], "CARDHOST_OFFLINE");
    }

    #[test]
    fn missing_type_fails_to_parse() {
        assert!(Frame::from_json(r#"{"payload":{}}"#).is_err());
    }
}
