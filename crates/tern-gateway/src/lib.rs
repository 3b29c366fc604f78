//! # tern-gateway
//!
//! Gateway socket transport: wire protocol, the resumable session, the
//! connection state machine, and ordered event dispatch to listeners.

pub mod connection;
pub mod dispatch;
pub mod events;
pub mod heartbeat;
pub mod protocol;
pub mod session;

pub use connection::{ConnectionState, GatewayConnection};
pub use dispatch::{DispatcherConfig, EventDispatcher, EventListener, ListenerId};
pub use events::{Event, EventType};
pub use heartbeat::HeartbeatMonitor;
pub use session::SessionManager;
