//! Pasta Infrastructure Library
//!
//! Shared infrastructure used by the services and the CLI:
//! - Rate limiting (fixed-window, sharded, clock-driven)
//! - Telemetry initialization (tracing subscriber)

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "rate-limit")]
pub use rate_limit::{RateLimitStatus, RateLimitSubject, RateLimiter};
