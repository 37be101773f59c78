use crate::application_port::RateLimiter;
use crate::domain_model::RateLimitInfo;
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// In-process leaky bucket: refills continuously at `limit` tokens per minute
/// up to `limit + burst`.
#[derive(Debug)]
pub struct LocalBucketLimiter {
    limit: u32,
    burst: u32,
    buckets: DashMap<String, Bucket>,
}

impl LocalBucketLimiter {
    /// `limit` is clamped to at least 1 so the refill rate is never zero.
    pub fn new(limit: u32, burst: u32) -> Self {
        Self {
            limit: limit.max(1),
            burst,
            buckets: DashMap::new(),
        }
    }

    fn capacity(&self) -> f64 {
        f64::from(self.limit) + f64::from(self.burst)
    }

    /// Forget buckets untouched for `max_idle`. Returns how many were dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last) < max_idle);
        before.saturating_sub(self.buckets.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    fn take(&self, key: &str) -> RateLimitInfo {
        let now = Instant::now();
        let wall = Utc::now();
        let capacity = self.capacity();
        let limit = f64::from(self.limit);

        let mut fresh = false;
        // Entry guard: one writer per key for the whole refill-and-take.
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| {
            fresh = true;
            Bucket {
                tokens: capacity - 1.0,
                last: now,
            }
        });
        if fresh {
            return RateLimitInfo::allow(self.limit, bucket.tokens as u32, wall + WINDOW);
        }

        let elapsed_minutes = now.saturating_duration_since(bucket.last).as_secs_f64() / 60.0;
        bucket.tokens = (bucket.tokens + elapsed_minutes * limit).min(capacity);
        bucket.last = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return RateLimitInfo::allow(self.limit, bucket.tokens.floor() as u32, wall + WINDOW);
        }

        let until_next = Duration::from_secs_f64((1.0 - bucket.tokens) / limit * 60.0);
        RateLimitInfo::deny(self.limit, wall + until_next)
    }
}

#[async_trait::async_trait]
impl RateLimiter for LocalBucketLimiter {
    async fn allow(&self, key: &str) -> RateLimitInfo {
        self.take(key)
    }
}
