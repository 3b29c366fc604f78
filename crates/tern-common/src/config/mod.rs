//! Configuration structs

mod client_config;

pub use client_config::{
    ClientConfig, ClientProperties, GatewayConfig, RestConfig, TransportEncoding,
};
