use chrono::{DateTime, Utc};
use serde::Serialize;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Outcome of a single rate limiter consultation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    pub fn allow(limit: u32, remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_at,
        }
    }

    pub fn deny(limit: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_at,
        }
    }

    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_at - now).num_seconds().max(0) as u64
    }

    /// Standard throttling headers. `Retry-After` is only present on deny.
    pub fn header_pairs(&self, now: DateTime<Utc>) -> Vec<(&'static str, u64)> {
        let mut headers = vec![
            (HEADER_LIMIT, u64::from(self.limit)),
            (HEADER_REMAINING, u64::from(self.remaining)),
            (HEADER_RESET, self.reset_at.timestamp().max(0) as u64),
        ];
        if !self.allowed {
            headers.push((HEADER_RETRY_AFTER, self.retry_after_secs(now)));
        }
        headers
    }
}
