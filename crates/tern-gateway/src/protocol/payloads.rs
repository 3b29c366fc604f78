//! Handshake payload definitions

use serde::{Deserialize, Serialize};
use tern_common::ClientProperties;

/// Payload of op 10 (Hello), the server's first frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Required heartbeat cadence in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload of op 2 (Identify), starts a brand-new session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Declared capability flags, opaque to the transport
    pub capabilities: u64,

    /// Client properties for the server's connection bookkeeping
    pub properties: IdentifyProperties,
}

/// Client properties reported during Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub client: String,
}

impl From<ClientProperties> for IdentifyProperties {
    fn from(props: ClientProperties) -> Self {
        Self {
            os: props.os,
            client: props.client,
        }
    }
}

/// Payload of op 4 (Resume), re-attaches to a prior session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session to re-attach to
    pub session_id: String,

    /// Last acknowledged sequence; the server replays everything after it
    pub seq: u64,
}

/// Payload of the READY dispatch event, confirms a fresh session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    /// Opaque session identity used for later resumes
    pub session_id: String,

    /// Endpoint to reconnect to when resuming this session
    pub resume_gateway_url: String,
}
