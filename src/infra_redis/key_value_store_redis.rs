use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult, Script};
use std::future::Future;
use std::time::Duration;

const COUNTER_DECREMENT: &str = include_str!("counter_decrement.lua");

/// Shared [`KeyValueStore`] with native TTLs; the authoritative backend when
/// more than one instance serves traffic.
pub struct RedisKeyValueStore {
    conn: ConnectionManager,
    op_timeout: Duration,
    counter_script: Script,
}

impl RedisKeyValueStore {
    pub fn new(conn: ConnectionManager, op_timeout: Duration) -> Self {
        RedisKeyValueStore {
            conn,
            op_timeout,
            counter_script: Script::new(COUNTER_DECREMENT),
        }
    }

    async fn timed<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(StoreError::Unavailable(format!(
                "timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

fn map_redis_error(e: RedisError) -> StoreError {
    match e.kind() {
        redis::ErrorKind::TypeError => StoreError::Corrupt(e.to_string()),
        // DECR on a non-integer fails server side, also inside the counter script.
        _ if e.to_string().contains("not an integer") => StoreError::Corrupt(e.to_string()),
        _ => StoreError::Unavailable(e.to_string()),
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs_f64().ceil().max(1.0) as u64
}

#[async_trait::async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.timed(conn.get::<_, Option<String>>(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.timed(conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.timed(conn.del::<_, ()>(key)).await
    }

    async fn decrement_or_init(
        &self,
        key: &str,
        initial: i64,
        ttl: Duration,
    ) -> Result<CounterState, StoreError> {
        let mut conn = self.conn.clone();
        let window_ms = ttl.as_millis().max(1) as u64;
        let mut invocation = self.counter_script.key(key);
        invocation.arg(initial).arg(window_ms);
        let (value, ttl_ms): (i64, i64) = self.timed(invocation.invoke_async(&mut conn)).await?;

        Ok(CounterState {
            value,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}
