//! Rate-limit guard flavors used by the security middleware chain's step 3
//! (spec §4.4): a declarative budget (`max` requests per `window_secs`)
//! bound to a key strategy, evaluated against a [`RateLimitRegistry`].
//!
//! The chain's own rate-limit step runs before authentication and is
//! always keyed by source address ([`PreAuthRateLimitGuard`]); the keyed
//! variants exist for call sites downstream of authentication that want a
//! per-user or global budget instead.

use crate::RateLimitRegistry;

/// How a [`RateLimitGuard`] derives its bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKeyKind {
    /// One shared bucket across every caller.
    Global,
    /// One bucket per authenticated user id (falls back to "anonymous").
    User,
    /// One bucket per source address.
    Ip,
}

/// A declarative rate-limit budget: `max` requests per `window_secs`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max: u64,
    pub window_secs: u64,
}

impl RateLimit {
    pub fn new(max: u64, window_secs: u64) -> Self {
        Self { max, window_secs }
    }

    /// Bind this budget to a key strategy, producing a [`RateLimitGuard`].
    pub fn keyed(self, key: RateLimitKeyKind) -> RateLimitGuard {
        RateLimitGuard { limit: self, key }
    }
}

/// A rate limit bound to a key strategy.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitGuard {
    pub limit: RateLimit,
    pub key: RateLimitKeyKind,
}

impl RateLimitGuard {
    fn bucket_key(&self, route: &str, user_id: Option<&str>, source: &str) -> String {
        match self.key {
            RateLimitKeyKind::Global => format!("{route}:global"),
            RateLimitKeyKind::User => {
                format!("{route}:user:{}", user_id.unwrap_or("anonymous"))
            }
            RateLimitKeyKind::Ip => format!("{route}:ip:{source}"),
        }
    }

    /// Try to consume one unit of budget for this (route, identity) pair.
    pub fn try_acquire(
        &self,
        registry: &RateLimitRegistry,
        route: &str,
        user_id: Option<&str>,
        source: &str,
    ) -> bool {
        registry.try_acquire(
            &self.bucket_key(route, user_id, source),
            self.limit.max,
            self.limit.window_secs,
        )
    }
}

/// The chain's step-3 rate limit (spec §4.4): per-source-address, always
/// evaluated before authentication has run, so it is keyed purely by
/// source address rather than by principal.
#[derive(Debug, Clone, Copy)]
pub struct PreAuthRateLimitGuard {
    pub limit: RateLimit,
}

impl PreAuthRateLimitGuard {
    pub fn new(limit: RateLimit) -> Self {
        Self { limit }
    }

    pub fn try_acquire(&self, registry: &RateLimitRegistry, source: &str) -> bool {
        registry.try_acquire(
            &format!("preauth:ip:{source}"),
            self.limit.max,
            self.limit.window_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::InMemoryRateLimiter;

    #[test]
    fn preauth_guard_is_keyed_by_source_address_only() {
        let registry = RateLimitRegistry::new(InMemoryRateLimiter::new());
        let guard = PreAuthRateLimitGuard::new(RateLimit::new(1, 60));
        assert!(guard.try_acquire(&registry, "1.2.3.4"));
        assert!(!guard.try_acquire(&registry, "1.2.3.4"));
        assert!(guard.try_acquire(&registry, "5.6.7.8"));
    }

    #[test]
    fn user_keyed_guard_separates_by_user_id() {
        let registry = RateLimitRegistry::new(InMemoryRateLimiter::new());
        let guard = RateLimit::new(1, 60).keyed(RateLimitKeyKind::User);
        assert!(guard.try_acquire(&registry, "/api", Some("u1"), "1.2.3.4"));
        assert!(!guard.try_acquire(&registry, "/api", Some("u1"), "9.9.9.9"));
        assert!(guard.try_acquire(&registry, "/api", Some("u2"), "1.2.3.4"));
    }

    #[test]
    fn global_guard_is_shared_across_every_caller() {
        let registry = RateLimitRegistry::new(InMemoryRateLimiter::new());
        let guard = RateLimit::new(1, 60).keyed(RateLimitKeyKind::Global);
        assert!(guard.try_acquire(&registry, "/api", Some("u1"), "1.1.1.1"));
        assert!(!guard.try_acquire(&registry, "/api", Some("u2"), "2.2.2.2"));
    }

    #[test]
    fn window_fully_consumed_blocks_the_bplus1th_request() {
        let registry = RateLimitRegistry::new(InMemoryRateLimiter::new());
        let guard = PreAuthRateLimitGuard::new(RateLimit::new(3, 900));
        for _ in 0..3 {
            assert!(guard.try_acquire(&registry, "10.0.0.1"));
        }
        assert!(!guard.try_acquire(&registry, "10.0.0.1"));
    }

    #[test]
    #[allow(clippy::unnecessary_literal_unwrap)]
    fn refills_after_the_window_elapses() {
        let registry = RateLimitRegistry::new(InMemoryRateLimiter::new());
        let guard = PreAuthRateLimitGuard::new(RateLimit::new(1, 0));
        assert!(guard.try_acquire(&registry, "10.0.0.1"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(guard.try_acquire(&registry, "10.0.0.1"));
    }
}
