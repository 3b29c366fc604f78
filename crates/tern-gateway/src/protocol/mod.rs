//! Gateway wire protocol
//!
//! Frame structure, operation codes, close codes, and handshake payloads.
//! The client speaks JSON text frames; the encoding knob only affects the
//! connection URL query.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{close_policy, CloseCode, ClosePolicy};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload};

/// Protocol version sent in the connection URL query
pub const GATEWAY_VERSION: u8 = 1;
