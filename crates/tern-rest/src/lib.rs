//! # tern-rest
//!
//! REST command transport: route signatures, the two-tier rate limiter, and
//! the retrying request executor.

pub mod executor;
pub mod ratelimit;
pub mod route;

pub use executor::{ApiRequest, ApiResponse, RequestExecutor};
pub use ratelimit::{Acquire, RateLimiter};
pub use route::{Method, Route};
