//! Client error types
//!
//! Typed errors for both transports. Anything recoverable by retry or
//! reconnect is handled inside the core; these are the errors that reach the
//! caller, plus the transient kinds the retry loops classify internally.

use std::time::Duration;
use thiserror::Error;

/// REST transport error type
#[derive(Debug, Error)]
pub enum RestError {
    /// Network-layer failure (connection reset, DNS, TLS, ...)
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// No response within the configured request timeout
    #[error("request timed out")]
    Timeout,

    /// Back-off signals kept arriving past the retry bound
    #[error("rate limit retries exhausted, last retry-after was {retry_after:?}")]
    RateLimitExhausted { retry_after: Duration },

    /// Transient failures kept occurring past the retry bound
    #[error("request retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// The server rejected the request (403)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist (404)
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-2xx response
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The client was shut down while the request was suspended
    #[error("request cancelled by shutdown")]
    Cancelled,
}

impl RestError {
    /// Whether the retry loop may absorb this error and try again
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Gateway transport error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// WebSocket-layer failure
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server never completed the Hello handshake
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server violated the wire protocol (malformed frame, sequence
    /// regression); the connection is forced through a reconnect
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Credentials were rejected; terminal, never retried
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The socket closed with a non-resumable close code; terminal
    #[error("connection closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// Reconnect attempts exceeded the configured bound
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectsExhausted { attempts: u32 },

    /// An operation was attempted after the connection failed fatally
    #[error("gateway is not connected: {0}")]
    NotConnected(String),

    /// The client was shut down
    #[error("gateway cancelled by shutdown")]
    Cancelled,
}

impl GatewayError {
    /// Whether the connection driver may recover from this by reconnecting
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Handshake(_) | Self::Protocol(_)
        )
    }
}

/// Error returned by an event listener
///
/// Caught at the dispatch boundary and logged; never propagated to the
/// connection or to other listeners.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Top-level client error type
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ClientError {
    /// Whether the error is terminal for the whole client
    ///
    /// Terminal errors require a caller decision (fresh credentials, a new
    /// client); everything else failed after the core already exhausted its
    /// internal recovery.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Gateway(
                GatewayError::AuthenticationFailed(_)
                    | GatewayError::Closed { .. }
                    | GatewayError::ReconnectsExhausted { .. }
            )
        )
    }
}

/// Top-level client result type
pub type ClientResult<T> = Result<T, ClientError>;
