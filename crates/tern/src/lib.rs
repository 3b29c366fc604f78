//! # tern
//!
//! Client core for the tern chat platform: a resumable gateway WebSocket with
//! heartbeat keep-alive and ordered event dispatch, plus a REST executor that
//! runs every call under a two-tier rate limiter.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tern::{Client, ClientConfig, EventType};
//!
//! # async fn example() -> tern::ClientResult<()> {
//! let client = Client::new(ClientConfig::new("my-token"))?;
//! client.on(EventType::MessageCreate, Arc::new(MyListener));
//! client.connect().await?;
//! # Ok(())
//! # }
//! # struct MyListener;
//! # #[async_trait::async_trait]
//! # impl tern::EventListener for MyListener {
//! #     async fn on_event(&self, _: &tern::Event) -> Result<(), tern::ListenerError> { Ok(()) }
//! # }
//! ```

pub mod client;

pub use client::Client;

// Re-export the public surface of the underlying crates
pub use tern_common::{
    ClientConfig, ClientError, ClientProperties, ClientResult, GatewayConfig, GatewayError,
    ListenerError, RestConfig, RestError, TracingConfig, TransportEncoding, init_tracing,
    try_init_tracing,
};
pub use tern_gateway::{
    ConnectionState, Event, EventListener, EventType, ListenerId,
};
pub use tern_rest::{ApiRequest, ApiResponse, Method, Route};
