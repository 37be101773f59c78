use crate::domain_model::RateLimitInfo;

/// Allow/deny with quota metadata, regardless of backend.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    async fn allow(&self, key: &str) -> RateLimitInfo;
}
