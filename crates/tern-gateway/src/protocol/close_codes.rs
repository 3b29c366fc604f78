//! WebSocket close codes and the client's reconnect policy

use serde::{Deserialize, Serialize};

/// Gateway-specific close codes (4000 range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error; safe to resume
    UnknownError = 4000,
    /// The client sent an invalid op code
    UnknownOpcode = 4001,
    /// The client sent a frame the server could not decode
    DecodeError = 4002,
    /// The client sent a payload before identifying
    NotAuthenticated = 4003,
    /// The token was rejected; terminal
    AuthenticationFailed = 4004,
    /// The client identified twice on one connection
    AlreadyAuthenticated = 4005,
    /// The sequence sent in a Resume was invalid
    InvalidSequence = 4007,
    /// The client sent frames too quickly
    RateLimited = 4008,
    /// The session lived past its deadline; reconnect and resume
    SessionTimeout = 4009,
    /// The client requested an unsupported protocol version; terminal
    InvalidApiVersion = 4012,
}

impl CloseCode {
    /// Decode a raw close code value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4012 => Some(Self::InvalidApiVersion),
            _ => None,
        }
    }

    /// Raw wire value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether the connection is unrecoverable after this code
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::InvalidApiVersion)
    }

    /// Human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error",
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload encoding",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSequence => "Invalid resume sequence",
            Self::RateLimited => "Rate limited",
            Self::SessionTimeout => "Session timeout",
            Self::InvalidApiVersion => "Invalid API version",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u16())
    }
}

/// What the client does after a close with a given code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePolicy {
    /// Terminal; surface the error and stop
    Fatal,
    /// Reconnect and resume the session
    Resume,
    /// Reconnect with a fresh identify; the session is gone
    Reidentify,
}

/// Decide the reconnect policy for any close code, gateway-specific or not
///
/// Normal WebSocket closure (1000/1001) invalidates the session but is not an
/// error; unknown codes are treated as transient and resumed.
#[must_use]
pub fn close_policy(code: u16) -> ClosePolicy {
    match CloseCode::from_u16(code) {
        Some(known) if known.is_fatal() => ClosePolicy::Fatal,
        Some(_) => ClosePolicy::Resume,
        None if code == 1000 || code == 1001 => ClosePolicy::Reidentify,
        None => ClosePolicy::Resume,
    }
}
