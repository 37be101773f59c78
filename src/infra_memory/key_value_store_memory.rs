use crate::domain_port::*;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Counter(i64),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local [`KeyValueStore`]. Expiry is enforced lazily on access and by
/// [`MemoryKeyValueStore::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    slots: DashMap<String, Slot>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_live(now));
        before.saturating_sub(self.slots.len())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let Some(slot) = self.slots.get(key) else {
            return Ok(None);
        };
        if !slot.is_live(now) {
            drop(slot);
            self.slots.remove_if(key, |_, slot| !slot.is_live(now));
            return Ok(None);
        }
        let value = match &slot.value {
            Value::Text(text) => text.clone(),
            Value::Counter(n) => n.to_string(),
        };
        Ok(Some(value))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Text(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.slots.remove(key);
        Ok(())
    }

    async fn decrement_or_init(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> Result<CounterState, StoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Counter(initial),
            expires_at: now,
        });

        if !slot.is_live(now) {
            slot.value = Value::Counter(initial);
            slot.expires_at = now + ttl;
            return Ok(CounterState {
                value: initial,
                ttl,
            });
        }

        let current = match &slot.value {
            Value::Counter(n) => *n,
            Value::Text(text) => text
                .parse::<i64>()
                .map_err(|_| StoreError::Corrupt(format!("{} is not a counter", key)))?,
        };
        let value = current - 1;
        slot.value = Value::Counter(value);
        Ok(CounterState {
            value,
            ttl: slot.expires_at.saturating_duration_since(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let store = MemoryKeyValueStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn counter_initializes_then_decrements() {
        let store = MemoryKeyValueStore::new();
        let ttl = Duration::from_secs(60);

        let first = store.decrement_or_init("c", 2, ttl).await.unwrap();
        assert_eq!(first, CounterState { value: 2, ttl });

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = store.decrement_or_init("c", 2, ttl).await.unwrap();
        assert_eq!(second.value, 1);
        assert_eq!(second.ttl, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        let fresh = store.decrement_or_init("c", 2, ttl).await.unwrap();
        assert_eq!(fresh.value, 2);
    }

    #[tokio::test]
    async fn decrementing_text_is_corrupt() {
        let store = MemoryKeyValueStore::new();
        store
            .set_with_ttl("k", "hello", Duration::from_secs(10))
            .await
            .unwrap();
        let err = store
            .decrement_or_init("k", 5, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let store = MemoryKeyValueStore::new();
        store
            .set_with_ttl("short", "1", Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set_with_ttl("long", "2", Duration::from_secs(100))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
