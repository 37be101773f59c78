use crate::application_port::RateLimiter;
use crate::domain_model::{RateLimitInfo, UserId};
use std::net::IpAddr;
use std::sync::Arc;

/// Per-IP then per-user throttling for one inbound request.
#[derive(Clone)]
pub struct RequestThrottle {
    by_ip: Option<Arc<dyn RateLimiter>>,
    by_user: Option<Arc<dyn RateLimiter>>,
}

impl RequestThrottle {
    pub fn new(by_ip: Arc<dyn RateLimiter>, by_user: Arc<dyn RateLimiter>) -> Self {
        Self {
            by_ip: Some(by_ip),
            by_user: Some(by_user),
        }
    }

    pub fn disabled() -> Self {
        Self {
            by_ip: None,
            by_user: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.by_ip.is_some() || self.by_user.is_some()
    }

    pub async fn check_ip(&self, ip: Option<IpAddr>) -> Option<RateLimitInfo> {
        let (limiter, ip) = (self.by_ip.as_ref()?, ip?);
        Some(limiter.allow(&format!("ip:{}", ip)).await)
    }

    pub async fn check_user(&self, user: UserId) -> Option<RateLimitInfo> {
        let limiter = self.by_user.as_ref()?;
        Some(limiter.allow(&format!("user:{}", user)).await)
    }

    /// Consult the IP limiter, then the user limiter when a user is known.
    /// The first deny wins; otherwise the last consulted answer is returned.
    /// `None` means no limiter applied.
    pub async fn check(&self, ip: Option<IpAddr>, user: Option<UserId>) -> Option<RateLimitInfo> {
        let by_ip = self.check_ip(ip).await;
        if let Some(info) = &by_ip {
            if !info.allowed {
                return by_ip;
            }
        }
        let by_user = match user {
            Some(user) => self.check_user(user).await,
            None => None,
        };
        by_user.or(by_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::LocalBucketLimiter;

    fn throttle(ip_limit: u32, user_limit: u32) -> RequestThrottle {
        RequestThrottle::new(
            Arc::new(LocalBucketLimiter::new(ip_limit, 0)),
            Arc::new(LocalBucketLimiter::new(user_limit, 0)),
        )
    }

    fn ip() -> Option<IpAddr> {
        Some("192.0.2.7".parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn ip_deny_short_circuits() {
        let throttle = throttle(1, 100);
        let user = Some(UserId(uuid::Uuid::new_v4()));
        assert!(throttle.check(ip(), user).await.unwrap().allowed);
        let info = throttle.check(ip(), user).await.unwrap();
        assert!(!info.allowed);
        assert_eq!(info.limit, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn user_deny_is_enough() {
        let throttle = throttle(100, 1);
        let user = Some(UserId(uuid::Uuid::new_v4()));
        assert!(throttle.check(ip(), user).await.unwrap().allowed);
        let info = throttle.check(ip(), user).await.unwrap();
        assert!(!info.allowed);
        assert_eq!(info.limit, 1);
    }

    #[tokio::test]
    async fn disabled_applies_nothing() {
        let throttle = RequestThrottle::disabled();
        assert!(!throttle.is_enabled());
        assert_eq!(throttle.check(ip(), None).await, None);
    }
}
