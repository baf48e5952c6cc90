use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur with the persistent object store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Persistent key-value object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; a missing key is [`StoreError::NotFound`]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Object store held in process memory
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

/// Object store in Redis without expiry, keys namespaced by `prefix`
pub struct RedisObjectStore {
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    prefix: String,
}

impl RedisObjectStore {
    pub async fn new(redis_url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            prefix: prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }
}

#[async_trait]
impl ObjectStore for RedisObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let full_key = self.full_key(key);
        let mut conn = self.redis.lock().await;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(&full_key)
            .query_async(&mut *conn)
            .await?;
        value.ok_or(StoreError::NotFound(full_key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(bytes)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("DEL")
            .arg(self.full_key(key))
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(store.get("missing").await, Err(StoreError::NotFound(_))));

        store.put("a/b.json", b"{}".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b.json").await.unwrap(), b"{}".to_vec());
        assert_eq!(store.len().await, 1);

        store.delete("a/b.json").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_store() {
        let store = RedisObjectStore::new("redis://127.0.0.1:6379", "govmatch-test")
            .await
            .expect("Failed to connect");
        store.put("k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), b"v".to_vec());
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.is_err());
    }
}
