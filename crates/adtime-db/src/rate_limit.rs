//! Fixed-window rate limiting on cache counters.
//!
//! Each `(user, action)` pair has a counter at
//! `ratelimit:{user_id}:{action}`. Every increment is followed by an
//! `EXPIRE .. NX`, so only the first one of a window sets the expiry, and a
//! counter whose expiry was never set (an interrupted call) gets one on the
//! next hit. When the key expires the next call starts a new window. A burst
//! straddling a window boundary can therefore reach twice the limit.

use std::time::Duration;

use adtime_types::{RateLimitAction, UserId};

use crate::cache::{self, CacheClient};
use crate::error::DbError;

/// Counts actions per user in fixed windows.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheClient,
}

impl RateLimiter {
    /// Create a limiter backed by `cache`.
    pub const fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Count one `action` by `user_id` and report whether the user is now
    /// over `limit` for the current `window`.
    ///
    /// The first `limit` calls in a window return `false`.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the counter cannot be incremented or its
    /// expiry cannot be set.
    pub async fn check(
        &self,
        user_id: UserId,
        action: RateLimitAction,
        limit: u32,
        window: Duration,
    ) -> Result<bool, DbError> {
        let key = cache::rate_limit_key(user_id, action);
        let count = self.cache.incr(&key).await?;
        self.cache.expire_if_unset(&key, window).await?;

        let limited = count > i64::from(limit);
        if limited {
            tracing::debug!(%user_id, action = action.as_str(), count, limit, "Rate limit exceeded");
        }
        Ok(limited)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn allows_limit_then_blocks_until_window_ends() {
        let limiter = RateLimiter::new(CacheClient::from(MemoryCache::new()));
        let user = UserId(7);

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(
                limiter
                    .check(user, RateLimitAction::PriceQuote, 3, WINDOW)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(results, vec![false, false, false, true]);

        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;

        let after = limiter
            .check(user, RateLimitAction::PriceQuote, 3, WINDOW)
            .await
            .unwrap();
        assert!(!after);
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_set_only_on_first_increment() {
        let mem = MemoryCache::new();
        let limiter = RateLimiter::new(CacheClient::from(mem.clone()));
        let key = cache::rate_limit_key(UserId(1), RateLimitAction::Command);

        limiter
            .check(UserId(1), RateLimitAction::Command, 10, WINDOW)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter
            .check(UserId(1), RateLimitAction::Command, 10, WINDOW)
            .await
            .unwrap();

        assert_eq!(mem.ttl(&key).await, Some(Duration::from_secs(15)));
    }

    #[tokio::test(start_paused = true)]
    async fn counter_left_without_expiry_recovers() {
        let mem = MemoryCache::new();
        let limiter = RateLimiter::new(CacheClient::from(mem.clone()));
        let key = cache::rate_limit_key(UserId(9), RateLimitAction::PriceQuote);

        // A call interrupted between INCR and EXPIRE.
        mem.incr(&key).await.unwrap();
        assert_eq!(mem.ttl(&key).await, None);

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(
                limiter
                    .check(UserId(9), RateLimitAction::PriceQuote, 3, WINDOW)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(results, vec![false, false, true, true]);
        assert_eq!(mem.ttl(&key).await, Some(WINDOW));

        tokio::time::advance(WINDOW + Duration::from_secs(1)).await;

        assert!(
            !limiter
                .check(UserId(9), RateLimitAction::PriceQuote, 3, WINDOW)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn counters_are_per_user_and_action() {
        let limiter = RateLimiter::new(CacheClient::from(MemoryCache::new()));

        assert!(!limiter.check(UserId(1), RateLimitAction::NewOrder, 1, WINDOW).await.unwrap());
        assert!(limiter.check(UserId(1), RateLimitAction::NewOrder, 1, WINDOW).await.unwrap());
        assert!(!limiter.check(UserId(2), RateLimitAction::NewOrder, 1, WINDOW).await.unwrap());
        assert!(!limiter.check(UserId(1), RateLimitAction::ShareContact, 1, WINDOW).await.unwrap());
    }
}
