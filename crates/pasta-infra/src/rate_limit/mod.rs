//! Per-subject request limiting for mutating operations.

mod limiter;

pub use limiter::{RateLimitStatus, RateLimitSubject, RateLimiter};
