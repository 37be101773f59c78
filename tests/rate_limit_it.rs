use chrono::Utc;
use sessionguard::application_impl::*;
use sessionguard::application_port::RateLimiter;
use sessionguard::domain_model::UserId;
use sessionguard::domain_port::*;
use sessionguard::infra_memory::MemoryKeyValueStore;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

fn counter(limit: u32) -> CounterRateLimiter {
    CounterRateLimiter::new(Arc::new(MemoryKeyValueStore::new()), limit, "ratelimit")
}

#[tokio::test(start_paused = true)]
async fn counter_denies_past_limit() {
    let limiter = counter(10);
    for i in 0..10 {
        let info = limiter.allow("ip:198.51.100.4").await;
        assert!(info.allowed, "call {} should pass", i + 1);
        assert_eq!(info.limit, 10);
    }
    let denied = limiter.allow("ip:198.51.100.4").await;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(denied.retry_after_secs(Utc::now()) <= 60);
}

#[tokio::test(start_paused = true)]
async fn counter_reports_remaining() {
    let limiter = counter(5);
    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(limiter.allow("user:1").await.remaining);
    }
    assert_eq!(seen, vec![4, 3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn counter_window_resets() {
    let limiter = counter(2);
    assert!(limiter.allow("k").await.allowed);
    assert!(limiter.allow("k").await.allowed);
    assert!(!limiter.allow("k").await.allowed);

    tokio::time::advance(Duration::from_secs(61)).await;
    let info = limiter.allow("k").await;
    assert!(info.allowed);
    assert_eq!(info.remaining, 1);
}

#[tokio::test(start_paused = true)]
async fn counter_keys_share_one_store() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let a = CounterRateLimiter::new(store.clone(), 1, "ratelimit");
    let b = CounterRateLimiter::new(store.clone(), 1, "ratelimit");
    assert!(a.allow("ip:1").await.allowed);
    assert!(!b.allow("ip:1").await.allowed);
    assert!(b.allow("ip:2").await.allowed);
}

struct BrokenStore;

#[async_trait::async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("timed out".to_string()))
    }

    async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("timed out".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("timed out".to_string()))
    }

    async fn decrement_or_init(
        &self,
        _key: &str,
        _initial: i64,
        _ttl: Duration,
    ) -> Result<CounterState, StoreError> {
        Err(StoreError::Unavailable("timed out".to_string()))
    }
}

#[tokio::test]
async fn store_outage_fails_open_by_default() {
    let limiter = CounterRateLimiter::new(Arc::new(BrokenStore), 10, "ratelimit");
    let info = limiter.allow("k").await;
    assert!(info.allowed);
    assert_eq!(info.remaining, 0);
}

#[tokio::test]
async fn store_outage_can_fail_closed() {
    let limiter = CounterRateLimiter::new(Arc::new(BrokenStore), 10, "ratelimit")
        .with_failure_policy(FailurePolicy::Closed);
    let info = limiter.allow("k").await;
    assert!(!info.allowed);
    assert_eq!(info.remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn throttle_headers_follow_the_decision() {
    let throttle = RequestThrottle::new(Arc::new(counter(1)), Arc::new(counter(100)));
    let ip: Option<IpAddr> = Some("203.0.113.9".parse().unwrap());
    let user = Some(UserId(uuid::Uuid::new_v4()));

    let first = throttle.check(ip, user).await.unwrap();
    let names: Vec<_> = first.header_pairs(Utc::now()).into_iter().map(|(n, _)| n).collect();
    assert!(!names.contains(&"Retry-After"));

    let second = throttle.check(ip, user).await.unwrap();
    assert!(!second.allowed);
    let names: Vec<_> = second.header_pairs(Utc::now()).into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"Retry-After"));
}

#[tokio::test(start_paused = true)]
async fn counter_with_zero_limit_denies_everything() {
    let limiter = counter(0);
    let info = limiter.allow("k").await;
    assert!(!info.allowed);
    assert_eq!(info.limit, 0);
    assert_eq!(info.remaining, 0);
}
