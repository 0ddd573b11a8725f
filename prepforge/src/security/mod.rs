//! Security module
//!
//! - [`client_ip`]: client address behind trusted proxies
//! - [`csrf`]: signed form tokens
//! - [`rate_limit`]: per-IP and per-user request limiting
//! - [`session`]: JWT session cookies

pub mod client_ip;
pub mod csrf;
pub mod rate_limit;
pub mod session;

pub use client_ip::client_ip;
pub use csrf::CsrfConfig;
pub use rate_limit::{RateLimit, RateLimiter};
pub use session::{SessionClaims, SessionConfig, SESSION_COOKIE};
