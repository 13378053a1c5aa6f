//! Middleware module
//!
//! Checks applied to every message before the dialogue runs

pub mod rate_limit;

pub use rate_limit::{RateLimitStatus, TokenRateLimiter};
