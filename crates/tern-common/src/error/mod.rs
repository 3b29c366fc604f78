//! Error taxonomy

mod client_error;

pub use client_error::{ClientError, ClientResult, GatewayError, ListenerError, RestError};
