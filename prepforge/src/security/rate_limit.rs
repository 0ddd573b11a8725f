//! Request rate limiting for account and API endpoints
//!
//! Two algorithms are used depending on the window length:
//! - Token bucket for short windows (smooths bursts of API calls)
//! - Sliding window for long windows (exact counting of signin attempts)
//!
//! This is unrelated to the daily question quota in [`crate::quota`]; it only
//! guards against brute force and request floods.
//!
//! # Example
//! ```no_run
//! use prepforge::security::rate_limit::{RateLimiter, RateLimit};
//! use std::net::IpAddr;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = RateLimiter::new();
//! let ip: IpAddr = "192.0.2.1".parse()?;
//!
//! if !limiter.check_ip_limit(&ip, RateLimit::SigninAttempts).await {
//!     println!("Too many signin attempts");
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimit {
    /// Signin form posts per IP
    SigninAttempts,
    /// Account creations per IP
    SignupAttempts,
    /// JSON API calls per signed-in user
    ApiRequestsPerUser,
}

impl RateLimit {
    pub fn max_requests(&self) -> usize {
        match self {
            RateLimit::SigninAttempts => 10,
            RateLimit::SignupAttempts => 5,
            RateLimit::ApiRequestsPerUser => 600,
        }
    }

    pub fn window_duration(&self) -> Duration {
        match self {
            RateLimit::SigninAttempts => Duration::from_secs(15 * 60),
            RateLimit::SignupAttempts => Duration::from_secs(3600),
            RateLimit::ApiRequestsPerUser => Duration::from_secs(60),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RateLimit::SigninAttempts => "Signin attempts per 15 minutes",
            RateLimit::SignupAttempts => "Signups per hour",
            RateLimit::ApiRequestsPerUser => "API requests per user per minute",
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: usize, window: Duration) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate: capacity as f64 / window.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn is_full(&mut self) -> bool {
        self.refill();
        self.tokens >= self.capacity
    }
}

#[derive(Debug, Clone)]
struct SlidingWindow {
    requests: Vec<Instant>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindow {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Vec::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    fn try_add(&mut self) -> bool {
        self.expire();
        if self.requests.len() < self.max_requests {
            self.requests.push(Instant::now());
            true
        } else {
            false
        }
    }

    fn expire(&mut self) {
        let window = self.window;
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < window);
    }

    fn count(&mut self) -> usize {
        self.expire();
        self.requests.len()
    }
}

#[derive(Debug, Clone)]
enum Algorithm {
    TokenBucket(TokenBucket),
    SlidingWindow(SlidingWindow),
}

impl Algorithm {
    fn new(limit: RateLimit) -> Self {
        let max = limit.max_requests();
        let window = limit.window_duration();

        if window.as_secs() <= 60 {
            Algorithm::TokenBucket(TokenBucket::new(max, window))
        } else {
            Algorithm::SlidingWindow(SlidingWindow::new(max, window))
        }
    }

    fn try_consume(&mut self) -> bool {
        match self {
            Algorithm::TokenBucket(bucket) => bucket.try_consume(),
            Algorithm::SlidingWindow(window) => window.try_add(),
        }
    }

    fn count(&mut self) -> usize {
        match self {
            Algorithm::TokenBucket(bucket) => {
                bucket.refill();
                (bucket.capacity - bucket.tokens).ceil() as usize
            }
            Algorithm::SlidingWindow(window) => window.count(),
        }
    }

    /// True when the entry carries no state worth keeping
    fn is_idle(&mut self) -> bool {
        match self {
            Algorithm::TokenBucket(bucket) => bucket.is_full(),
            Algorithm::SlidingWindow(window) => window.count() == 0,
        }
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
enum LimitKey {
    Ip(IpAddr, RateLimit),
    User(i64, RateLimit),
}

/// Per-IP and per-user request limiter
pub struct RateLimiter {
    limits: Arc<RwLock<HashMap<LimitKey, Algorithm>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            limits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a request from `ip`; `false` when the limit is exceeded
    pub async fn check_ip_limit(&self, ip: &IpAddr, limit_type: RateLimit) -> bool {
        let allowed = self.check(LimitKey::Ip(*ip, limit_type), limit_type).await;
        if !allowed {
            warn!(
                "Rate limit exceeded for IP {}: {} ({})",
                ip,
                limit_type.description(),
                limit_type.max_requests()
            );
        }
        allowed
    }

    /// Record a request from a signed-in user; `false` when the limit is exceeded
    pub async fn check_user_limit(&self, user_id: i64, limit_type: RateLimit) -> bool {
        let allowed = self
            .check(LimitKey::User(user_id, limit_type), limit_type)
            .await;
        if !allowed {
            warn!(
                "Rate limit exceeded for user {}: {} ({})",
                user_id,
                limit_type.description(),
                limit_type.max_requests()
            );
        }
        allowed
    }

    async fn check(&self, key: LimitKey, limit_type: RateLimit) -> bool {
        let mut limits = self.limits.write().await;
        limits
            .entry(key)
            .or_insert_with(|| Algorithm::new(limit_type))
            .try_consume()
    }

    pub async fn get_ip_count(&self, ip: &IpAddr, limit_type: RateLimit) -> usize {
        let mut limits = self.limits.write().await;
        limits
            .get_mut(&LimitKey::Ip(*ip, limit_type))
            .map(Algorithm::count)
            .unwrap_or(0)
    }

    pub async fn reset_ip_limit(&self, ip: &IpAddr, limit_type: RateLimit) {
        let mut limits = self.limits.write().await;
        limits.remove(&LimitKey::Ip(*ip, limit_type));
        debug!("Reset rate limit for IP {}: {}", ip, limit_type.description());
    }

    /// Drop entries that no longer hold any request history
    pub async fn cleanup(&self) -> usize {
        let mut limits = self.limits.write().await;
        let before = limits.len();
        limits.retain(|_, algorithm| !algorithm.is_idle());
        let removed = before - limits.len();
        if removed > 0 {
            debug!("Rate limiter cleanup removed {} idle entries", removed);
        }
        removed
    }

    pub async fn tracked_entries(&self) -> usize {
        self.limits.read().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket() {
        let mut bucket = TokenBucket::new(10, Duration::from_secs(10));
        for _ in 0..10 {
            assert!(bucket.try_consume());
        }
        assert!(!bucket.try_consume());
    }

    #[test]
    fn test_sliding_window() {
        let mut window = SlidingWindow::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(window.try_add());
        }
        assert!(!window.try_add());
        assert_eq!(window.count(), 5);
    }

    #[tokio::test]
    async fn test_signin_attempts_limited_per_ip() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        let other: IpAddr = "192.0.2.2".parse().unwrap();

        for _ in 0..10 {
            assert!(limiter.check_ip_limit(&ip, RateLimit::SigninAttempts).await);
        }
        assert!(!limiter.check_ip_limit(&ip, RateLimit::SigninAttempts).await);
        assert_eq!(limiter.get_ip_count(&ip, RateLimit::SigninAttempts).await, 10);

        // Other IPs and other limit types are unaffected
        assert!(limiter.check_ip_limit(&other, RateLimit::SigninAttempts).await);
        assert!(limiter.check_ip_limit(&ip, RateLimit::SignupAttempts).await);
    }

    #[tokio::test]
    async fn test_user_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.check_user_limit(7, RateLimit::SignupAttempts).await);
        }
        assert!(!limiter.check_user_limit(7, RateLimit::SignupAttempts).await);
        assert!(limiter.check_user_limit(8, RateLimit::SignupAttempts).await);
        assert!(limiter.check_user_limit(7, RateLimit::ApiRequestsPerUser).await);
    }

    #[tokio::test]
    async fn test_reset() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "192.0.2.1".parse().unwrap();

        for _ in 0..5 {
            limiter.check_ip_limit(&ip, RateLimit::SignupAttempts).await;
        }
        assert!(!limiter.check_ip_limit(&ip, RateLimit::SignupAttempts).await);

        limiter.reset_ip_limit(&ip, RateLimit::SignupAttempts).await;
        assert!(limiter.check_ip_limit(&ip, RateLimit::SignupAttempts).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_active_entries() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        limiter.check_ip_limit(&ip, RateLimit::SigninAttempts).await;

        assert_eq!(limiter.cleanup().await, 0);
        assert_eq!(limiter.tracked_entries().await, 1);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(RateLimit::SigninAttempts.max_requests(), 10);
        assert_eq!(
            RateLimit::ApiRequestsPerUser.window_duration(),
            Duration::from_secs(60)
        );
        assert_eq!(RateLimit::SignupAttempts.description(), "Signups per hour");
    }
}
