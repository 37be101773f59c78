use crate::application_port::RateLimiter;
use crate::domain_model::RateLimitInfo;
use crate::domain_port::KeyValueStore;
use crate::logger::*;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(60);

/// What to answer when the shared counter cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the request, reporting zero remaining.
    #[default]
    Open,
    /// Deny the request.
    Closed,
}

/// Fixed one-minute window counter kept in a shared store, so every instance
/// draws from the same quota.
pub struct CounterRateLimiter {
    store: Arc<dyn KeyValueStore>,
    limit: u32,
    prefix: String,
    on_store_error: FailurePolicy,
}

impl CounterRateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: u32, prefix: impl Into<String>) -> Self {
        Self {
            store,
            limit,
            prefix: prefix.into(),
            on_store_error: FailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_store_error = policy;
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait::async_trait]
impl RateLimiter for CounterRateLimiter {
    async fn allow(&self, key: &str) -> RateLimitInfo {
        let counter_key = self.key(key);
        let initial = i64::from(self.limit) - 1;

        match self
            .store
            .decrement_or_init(&counter_key, initial, WINDOW)
            .await
        {
            // A negative count is a deny; it is never retried or repaired here.
            Ok(state) if state.value >= 0 => {
                let remaining = state.value.min(initial) as u32;
                RateLimitInfo::allow(self.limit, remaining, Utc::now() + state.ttl)
            }
            Ok(state) => RateLimitInfo::deny(self.limit, Utc::now() + state.ttl),
            Err(e) => {
                let reset_at = Utc::now() + WINDOW;
                match self.on_store_error {
                    FailurePolicy::Open => {
                        warn!(key = %counter_key, "rate limit store error, allowing: {}", e);
                        RateLimitInfo::allow(self.limit, 0, reset_at)
                    }
                    FailurePolicy::Closed => {
                        warn!(key = %counter_key, "rate limit store error, denying: {}", e);
                        RateLimitInfo::deny(self.limit, reset_at)
                    }
                }
            }
        }
    }
}
