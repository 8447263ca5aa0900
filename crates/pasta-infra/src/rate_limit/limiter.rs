use chrono::{DateTime, Duration, Utc};
use pasta_core::{AppError, Clock};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_SHARDS: usize = 16;
const DEFAULT_MAX_BUCKETS: usize = 10_000;

/// Who a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitSubject {
    /// Authenticated mutating calls are counted per API key.
    ApiKey(String),
    /// Anonymous calls (e.g. requesting a key) are counted per client IP.
    Ip(String),
}

impl fmt::Display for RateLimitSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitSubject::ApiKey(key) => write!(f, "api_key:{}", key),
            RateLimitSubject::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Outcome of an allowed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct RateLimitBucket {
    count: u32,
    reset_at: DateTime<Utc>,
}

impl RateLimitBucket {
    fn new(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }

    /// Counts the request only when it is allowed; a rejection leaves the bucket untouched.
    fn check_and_increment(
        &mut self,
        now: DateTime<Utc>,
        limit: u32,
        window: Duration,
    ) -> Result<u32, DateTime<Utc>> {
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + window;
        }

        if self.count < limit {
            self.count += 1;
            Ok(limit - self.count)
        } else {
            Err(self.reset_at)
        }
    }
}

/// Fixed-window rate limiter
///
/// Buckets are spread over several shards so unrelated subjects rarely
/// contend on the same lock. Each limiter has a `scope` (e.g. `"paste_create"`)
/// so separate operations keep separate budgets.
#[derive(Clone)]
pub struct RateLimiter {
    scope: &'static str,
    shards: Vec<Arc<Mutex<HashMap<String, RateLimitBucket>>>>,
    limit: u32,
    window: Duration,
    max_buckets: usize,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` requests per `window_secs` per subject.
    pub fn new(scope: &'static str, limit: u32, window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self::with_shards(scope, limit, window_secs, clock, DEFAULT_SHARDS)
    }

    pub fn with_shards(
        scope: &'static str,
        limit: u32,
        window_secs: u64,
        clock: Arc<dyn Clock>,
        shard_count: usize,
    ) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        Self {
            scope,
            shards,
            limit,
            window: Duration::seconds(window_secs.min(i64::MAX as u64) as i64),
            max_buckets: DEFAULT_MAX_BUCKETS,
            clock,
        }
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Count one request for `subject`, or fail with `RateLimited` if its
    /// budget for the current window is spent.
    pub async fn allow(&self, subject: &RateLimitSubject) -> Result<RateLimitStatus, AppError> {
        let key = format!("{}:{}", self.scope, subject);
        let now = self.clock.now();
        let shard = &self.shards[self.shard_index(&key)];
        let mut buckets = shard.lock().await;

        if buckets.len() >= self.max_buckets && !buckets.contains_key(&key) {
            buckets.retain(|_, bucket| bucket.reset_at > now);

            if buckets.len() >= self.max_buckets {
                let oldest_key = buckets
                    .iter()
                    .min_by_key(|(_, bucket)| bucket.reset_at)
                    .map(|(k, _)| k.clone());
                if let Some(key_to_remove) = oldest_key {
                    buckets.remove(&key_to_remove);
                }
            }
        }

        let bucket = buckets
            .entry(key)
            .or_insert_with(|| RateLimitBucket::new(now, self.window));

        match bucket.check_and_increment(now, self.limit, self.window) {
            Ok(remaining) => Ok(RateLimitStatus {
                remaining,
                reset_at: bucket.reset_at,
            }),
            Err(reset_at) => {
                let retry_after_secs = (reset_at - now).num_seconds().max(1) as u64;
                tracing::warn!(
                    scope = self.scope,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                Err(AppError::RateLimited { retry_after_secs })
            }
        }
    }

    /// Drop buckets whose window has ended. Returns how many were removed.
    pub async fn cleanup_expired_buckets(&self) -> usize {
        let now = self.clock.now();
        let mut total_cleaned = 0;
        for shard in &self.shards {
            let mut buckets = shard.lock().await;
            let before = buckets.len();
            buckets.retain(|_, bucket| bucket.reset_at > now);
            total_cleaned += before - buckets.len();
        }
        if total_cleaned > 0 {
            tracing::debug!(
                scope = self.scope,
                buckets_cleaned = total_cleaned,
                "Cleaned up expired rate limit buckets"
            );
        }
        total_cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasta_core::ManualClock;

    fn limiter(limit: u32, window_secs: u64) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::starting_now();
        (
            RateLimiter::new("test", limit, window_secs, Arc::new(clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_rejects() {
        let (limiter, _clock) = limiter(3, 60);
        let subject = RateLimitSubject::ApiKey("k".to_string());

        for expected_remaining in [2, 1, 0] {
            let status = limiter.allow(&subject).await.unwrap();
            assert_eq!(status.remaining, expected_remaining);
        }

        let err = limiter.allow(&subject).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { retry_after_secs } if retry_after_secs <= 60));
    }

    #[tokio::test]
    async fn test_rejection_does_not_consume_budget() {
        let (limiter, clock) = limiter(1, 60);
        let subject = RateLimitSubject::Ip("10.0.0.1".to_string());

        limiter.allow(&subject).await.unwrap();
        for _ in 0..5 {
            assert!(limiter.allow(&subject).await.is_err());
        }

        // The window end did not move because of the rejected calls.
        clock.advance(Duration::seconds(61));
        assert!(limiter.allow(&subject).await.is_ok());
    }

    #[tokio::test]
    async fn test_subjects_are_independent() {
        let (limiter, _clock) = limiter(1, 60);
        limiter
            .allow(&RateLimitSubject::ApiKey("a".to_string()))
            .await
            .unwrap();
        limiter
            .allow(&RateLimitSubject::ApiKey("b".to_string()))
            .await
            .unwrap();
        // Same raw value under a different subject kind has its own bucket.
        limiter
            .allow(&RateLimitSubject::Ip("a".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_removes_finished_windows() {
        let (limiter, clock) = limiter(5, 10);
        limiter
            .allow(&RateLimitSubject::Ip("1.2.3.4".to_string()))
            .await
            .unwrap();
        assert_eq!(limiter.cleanup_expired_buckets().await, 0);

        clock.advance(Duration::seconds(11));
        assert_eq!(limiter.cleanup_expired_buckets().await, 1);
    }
}
