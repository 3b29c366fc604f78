//! # tern-common
//!
//! Shared utilities for the tern client: configuration, error taxonomy, and telemetry.

pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    ClientConfig, ClientProperties, GatewayConfig, RestConfig, TransportEncoding,
};
pub use error::{ClientError, ClientResult, GatewayError, ListenerError, RestError};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
