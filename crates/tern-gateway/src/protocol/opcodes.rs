//! Gateway operation codes

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Operation codes carried in the `op` field of every gateway frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Event delivery from the server, carries `t` and `s`
    Dispatch = 0,
    /// Keep-alive, sent by the client on the server-specified cadence
    /// (the server may also request one out of band)
    Heartbeat = 1,
    /// Start a brand-new session (client only)
    Identify = 2,
    /// Re-attach to a prior session from the last acknowledged sequence
    /// (client only)
    Resume = 4,
    /// Server asks the client to disconnect and resume (server only)
    Reconnect = 5,
    /// The session is invalid; payload carries a resumable flag (server only)
    InvalidSession = 7,
    /// First frame after connecting, carries the heartbeat interval
    /// (server only)
    Hello = 10,
    /// Acknowledges a client heartbeat (server only)
    HeartbeatAck = 11,
}

impl OpCode {
    /// Decode a raw op code value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            4 => Some(Self::Resume),
            5 => Some(Self::Reconnect),
            7 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    /// Raw wire value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the client may send this op code
    #[must_use]
    pub const fn is_client_op(self) -> bool {
        matches!(self, Self::Heartbeat | Self::Identify | Self::Resume)
    }

    /// Whether the server may send this op code
    #[must_use]
    pub const fn is_server_op(self) -> bool {
        !matches!(self, Self::Identify | Self::Resume)
    }

    /// Human-readable name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::InvalidSession => "InvalidSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value).ok_or_else(|| serde::de::Error::custom(format!("invalid op code: {value}")))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_roundtrip() {
        for op in [
            OpCode::Dispatch,
            OpCode::Heartbeat,
            OpCode::Identify,
            OpCode::Resume,
            OpCode::Reconnect,
            OpCode::InvalidSession,
            OpCode::Hello,
            OpCode::HeartbeatAck,
        ] {
            assert_eq!(OpCode::from_u8(op.as_u8()), Some(op));
        }
        assert_eq!(OpCode::from_u8(3), None);
        assert_eq!(OpCode::from_u8(6), None);
        assert_eq!(OpCode::from_u8(255), None);
    }

    #[test]
    fn test_direction() {
        assert!(OpCode::Identify.is_client_op());
        assert!(OpCode::Resume.is_client_op());
        assert!(OpCode::Heartbeat.is_client_op());
        assert!(!OpCode::Hello.is_client_op());

        assert!(OpCode::Dispatch.is_server_op());
        assert!(OpCode::Heartbeat.is_server_op());
        assert!(!OpCode::Identify.is_server_op());
        assert!(!OpCode::Resume.is_server_op());
    }

    #[test]
    fn test_integer_serde() {
        assert_eq!(serde_json::to_string(&OpCode::Hello).unwrap(), "10");
        let op: OpCode = serde_json::from_str("4").unwrap();
        assert_eq!(op, OpCode::Resume);
        assert!(serde_json::from_str::<OpCode>("3").is_err());
    }
}
