//! Redis-backed fixed-window rate limiting
//!
//! One counter per client identity per window, maintained with INCR plus a
//! window-length EXPIRE set on first increment. Without a configured Redis
//! URL every request is allowed; Redis errors also fail open, since dropping
//! traffic because the limiter store is down is worse than briefly not
//! limiting.

use tracing::warn;

use crate::config::RateLimitConfig;
use crate::errors::RepChatError;
use crate::errors::Result;

/// Outcome of one rate-limit check, echoed back to the client on rejection
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the current window resets
    pub reset: u64,
}

impl RateLimitDecision {
    fn allow_all(limit: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: limit,
            reset: 0,
        }
    }
}

/// Fixed-window limiter keyed by client identity
#[derive(Clone)]
pub struct RateLimiter {
    client: Option<redis::Client>,
    namespace: String,
    max_requests: u64,
    window_secs: u64,
}

impl RateLimiter {
    /// Build from config. An absent Redis URL yields a limiter that allows
    /// everything.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        let client = match &config.redis_url {
            Some(url) => Some(
                redis::Client::open(url.as_str())
                    .map_err(|e| RepChatError::Config(format!("Redis open error: {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            client,
            namespace: config.namespace.clone(),
            max_requests: config.max_requests,
            window_secs: config.window_secs,
        })
    }

    /// Check and count one request for `identity` (typically the client IP
    /// or user id).
    pub async fn check(&self, identity: &str) -> RateLimitDecision {
        let Some(client) = &self.client else {
            return RateLimitDecision::allow_all(self.max_requests);
        };

        match self.check_redis(client, identity).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Rate limiter unavailable, failing open: {e}");
                RateLimitDecision::allow_all(self.max_requests)
            }
        }
    }

    async fn check_redis(
        &self,
        client: &redis::Client,
        identity: &str,
    ) -> Result<RateLimitDecision> {
        let key = format!("{}{}", self.namespace, identity);
        let mut conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| RepChatError::Http(format!("Redis connect error: {e}")))?;

        // INCR first; set the expiry only when this increment opened the
        // window so the window length never slides
        let count: u64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RepChatError::Http(format!("Redis INCR error: {e}")))?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.window_secs)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| RepChatError::Http(format!("Redis EXPIRE error: {e}")))?;
        }

        let reset: i64 = redis::cmd("TTL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RepChatError::Http(format!("Redis TTL error: {e}")))?;

        Ok(RateLimitDecision {
            allowed: count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            reset: reset.max(0) as u64,
        })
    }
}
