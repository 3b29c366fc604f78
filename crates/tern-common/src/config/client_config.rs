//! Client configuration structs
//!
//! All knobs the client core exposes, with serde support so deployments can
//! load them from a file and builder methods for programmatic construction.

use serde::Deserialize;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Authentication token sent in Identify and on every REST request
    pub token: String,

    /// Declared capability flags, carried opaquely in the Identify payload
    #[serde(default)]
    pub capabilities: u64,

    /// Client properties reported during Identify
    #[serde(default)]
    pub properties: ClientProperties,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub rest: RestConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            capabilities: 0,
            properties: ClientProperties::default(),
            gateway: GatewayConfig::default(),
            rest: RestConfig::default(),
        }
    }

    /// Set the declared capability flags
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: u64) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the client properties
    #[must_use]
    pub fn with_properties(mut self, properties: ClientProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Set the gateway configuration
    #[must_use]
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    /// Set the REST configuration
    #[must_use]
    pub fn with_rest(mut self, rest: RestConfig) -> Self {
        self.rest = rest;
        self
    }
}

/// Client properties reported to the server during Identify
#[derive(Debug, Clone, Deserialize)]
pub struct ClientProperties {
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_client_name")]
    pub client: String,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            os: default_os(),
            client: default_client_name(),
        }
    }
}

/// Wire encoding for the gateway socket
///
/// Only affects the connection URL query; frame handling is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportEncoding {
    /// JSON text frames
    #[default]
    Json,
}

impl TransportEncoding {
    /// Query-string value for the connection URL
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
        }
    }
}

/// Gateway connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Apply random jitter to the first heartbeat to avoid thundering-herd
    /// reconnects after an outage
    #[serde(default = "default_heartbeat_jitter")]
    pub heartbeat_jitter: bool,

    /// Give up after this many consecutive failed reconnect attempts
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Declare the connection dead when no frame arrives for this long
    #[serde(default = "default_heartbeat_timeout", with = "secs")]
    pub heartbeat_timeout: Duration,

    /// Wire encoding requested from the server
    #[serde(default)]
    pub encoding: TransportEncoding,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_jitter: default_heartbeat_jitter(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_timeout: default_heartbeat_timeout(),
            encoding: TransportEncoding::default(),
        }
    }
}

impl GatewayConfig {
    /// Toggle first-heartbeat jitter
    #[must_use]
    pub fn with_heartbeat_jitter(mut self, jitter: bool) -> Self {
        self.heartbeat_jitter = jitter;
        self
    }

    /// Set the reconnect attempt bound
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the dead-connection timeout
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }
}

/// REST executor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    /// Base URL for the command API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request response timeout
    #[serde(default = "default_request_timeout", with = "secs")]
    pub request_timeout: Duration,

    /// Retry bound for transient failures and absorbed back-off signals
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Evict route buckets unused for this long
    #[serde(default = "default_bucket_idle_period", with = "secs")]
    pub bucket_idle_period: Duration,

    /// Optimistic global request budget per one-second window
    #[serde(default = "default_global_limit")]
    pub global_limit: u64,

    /// User-Agent header sent on every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            bucket_idle_period: default_bucket_idle_period(),
            global_limit: default_global_limit(),
            user_agent: default_user_agent(),
        }
    }
}

impl RestConfig {
    /// Set the API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry bound
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the idle bucket eviction period
    #[must_use]
    pub fn with_bucket_idle_period(mut self, period: Duration) -> Self {
        self.bucket_idle_period = period;
        self
    }
}

// Default value functions
fn default_os() -> String {
    std::env::consts::OS.to_string()
}

fn default_client_name() -> String {
    "tern".to_string()
}

fn default_heartbeat_jitter() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_base_url() -> String {
    "https://chat.example.com/api/v1".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    5
}

fn default_bucket_idle_period() -> Duration {
    Duration::from_secs(300)
}

fn default_global_limit() -> u64 {
    50
}

fn default_user_agent() -> String {
    concat!("tern/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Serde helper for durations expressed in whole seconds
mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
