//! Gateway frame format
//!
//! Every frame is `{ op, t?, s?, d? }`. Constructors cover the frames the
//! client sends; accessors decode the frames the server sends.

use super::{HelloPayload, IdentifyPayload, OpCode, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single gateway frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event type (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    // === Frames the client sends ===

    /// Heartbeat frame (op=1) carrying the last received sequence
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            t: None,
            s: None,
            d: last_sequence.map(|s| Value::Number(s.into())),
        }
    }

    /// Identify frame (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self {
            op: OpCode::Identify,
            t: None,
            s: None,
            d: serde_json::to_value(payload).ok(),
        }
    }

    /// Resume frame (op=4)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self {
            op: OpCode::Resume,
            t: None,
            s: None,
            d: serde_json::to_value(payload).ok(),
        }
    }

    // === Decoding frames the server sends ===

    /// Decode the Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Decode the invalid-session resumable flag (op=7)
    ///
    /// A missing or malformed payload is read as non-resumable.
    #[must_use]
    pub fn invalid_session_resumable(&self) -> bool {
        self.d.as_ref().and_then(Value::as_bool).unwrap_or(false)
    }

    /// Decode a dispatch frame (op=0) into its event parts
    ///
    /// Returns the event type tag, sequence number, and payload.
    pub fn as_dispatch(&self) -> Option<(&str, u64, Value)> {
        if self.op != OpCode::Dispatch {
            return None;
        }
        let event_type = self.t.as_deref()?;
        let sequence = self.s?;
        Some((event_type, sequence, self.d.clone().unwrap_or(Value::Null)))
    }

    // === Utilities ===

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON text frame
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.t, self.s) {
            (Some(t), Some(s)) => write!(f, "GatewayMessage(op={}, t={t}, s={s})", self.op),
            _ => write!(f, "GatewayMessage(op={})", self.op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_frame() {
        let msg = GatewayMessage::heartbeat(Some(41));
        assert_eq!(msg.op, OpCode::Heartbeat);
        assert_eq!(msg.d, Some(Value::Number(41.into())));

        let fresh = GatewayMessage::heartbeat(None);
        assert!(fresh.d.is_none());
    }

    #[test]
    fn test_identify_frame() {
        let payload = IdentifyPayload {
            token: "t".to_string(),
            capabilities: 1,
            properties: super::super::IdentifyProperties {
                os: "linux".to_string(),
                client: "tern".to_string(),
            },
        };
        let msg = GatewayMessage::identify(&payload);

        assert_eq!(msg.op, OpCode::Identify);
        assert_eq!(msg.d.as_ref().unwrap()["token"], "t");
    }

    #[test]
    fn test_hello_decoding() {
        let msg = GatewayMessage::from_json(r#"{"op":10,"d":{"heartbeat_interval":41250}}"#).unwrap();
        let hello = msg.as_hello().unwrap();
        assert_eq!(hello.heartbeat_interval, 41_250);

        // wrong op decodes to nothing
        let ack = GatewayMessage::from_json(r#"{"op":11}"#).unwrap();
        assert!(ack.as_hello().is_none());
    }

    #[test]
    fn test_invalid_session_flag() {
        let resumable = GatewayMessage::from_json(r#"{"op":7,"d":true}"#).unwrap();
        assert!(resumable.invalid_session_resumable());

        let dead = GatewayMessage::from_json(r#"{"op":7,"d":false}"#).unwrap();
        assert!(!dead.invalid_session_resumable());

        // missing payload means the session is gone
        let missing = GatewayMessage::from_json(r#"{"op":7}"#).unwrap();
        assert!(!missing.invalid_session_resumable());
    }

    #[test]
    fn test_dispatch_decoding() {
        let msg =
            GatewayMessage::from_json(r#"{"op":0,"t":"MESSAGE_CREATE","s":7,"d":{"id":"1"}}"#).unwrap();
        let (event_type, sequence, data) = msg.as_dispatch().unwrap();

        assert_eq!(event_type, "MESSAGE_CREATE");
        assert_eq!(sequence, 7);
        assert_eq!(data["id"], "1");

        // a dispatch without a sequence is malformed
        let broken = GatewayMessage::from_json(r#"{"op":0,"t":"MESSAGE_CREATE"}"#).unwrap();
        assert!(broken.as_dispatch().is_none());
    }

    #[test]
    fn test_roundtrip() {
        let msg = GatewayMessage::heartbeat(Some(3));
        let parsed = GatewayMessage::from_json(&msg.to_json().unwrap()).unwrap();
        assert_eq!(parsed.op, msg.op);
        assert_eq!(parsed.d, msg.d);
    }
}
