use crate::domain_port::{KeyValueStore, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Namespaced store key for one refresh session, e.g. `refresh:<jti>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Holds the one live refresh token string per session id.
///
/// With the in-memory backend this is only sound for a single instance; the
/// redis backend is authoritative across instances.
#[derive(Clone)]
pub struct RefreshStore {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl RefreshStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        RefreshStore {
            kv,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, token_id: &str) -> SessionKey {
        SessionKey(format!("{}:{}", self.prefix, token_id))
    }

    pub async fn put(&self, key: &SessionKey, token: &str, ttl: Duration) -> Result<(), StoreError> {
        self.kv.set_with_ttl(key.as_str(), token, ttl).await
    }

    pub async fn get(&self, key: &SessionKey) -> Result<Option<String>, StoreError> {
        self.kv.get(key.as_str()).await
    }

    pub async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.kv.delete(key.as_str()).await
    }
}
