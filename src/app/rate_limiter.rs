use anyhow::Result;

use crate::config::rate_limits::{current_window, RateAction, RateLimits};
use crate::infra::cache::RedisCache;

pub struct RateLimitInfo {
    pub limited: bool,
    pub limit: u32,
    pub remaining: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: RedisCache,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(cache: RedisCache, limits: RateLimits) -> Self {
        Self { cache, limits }
    }

    /// Checks the window for `subject` (a student id or a client IP) and
    /// counts this request when it is allowed.
    pub async fn hit(&self, subject: &str, action: RateAction) -> Result<RateLimitInfo> {
        let (limit, window) = self.limits.limit_for(action);
        let window_seconds = window.seconds();
        let key = format!(
            "ratelimit:{}:{}:{}",
            subject,
            action.as_str(),
            current_window(window_seconds)
        );

        let count = self.cache.counter(&key).await?;
        if count >= limit {
            tracing::debug!(
                subject,
                action = action.as_str(),
                count,
                limit,
                "rate limit exceeded"
            );
            return Ok(RateLimitInfo {
                limited: true,
                limit,
                remaining: 0,
            });
        }

        let count = self.cache.bump_counter(&key, window_seconds).await?;
        Ok(RateLimitInfo {
            limited: false,
            limit,
            remaining: limit.saturating_sub(count),
        })
    }
}
