use std::time::Duration;

/// Value and remaining lifetime of a windowed counter after one decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub value: i64,
    pub ttl: Duration,
}

#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically decrement `key`. A missing key is created at `initial` with
    /// the given `ttl` and returned without being decremented.
    async fn decrement_or_init(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> Result<CounterState, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt value: {0}")]
    Corrupt(String),
}
