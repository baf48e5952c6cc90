use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Byte-oriented TTL cache
///
/// Scorers never see the backend; a process-local map and a shared Redis
/// instance are interchangeable behind this trait.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Lifetime of an entry after it is set
    fn ttl(&self) -> Duration;
}

/// Process-local cache backed by moka
pub struct LocalCache {
    entries: moka::future::Cache<String, Vec<u8>>,
    ttl: Duration,
}

impl LocalCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let entries = moka::future::CacheBuilder::new(capacity)
            .time_to_live(ttl)
            .build();
        Self { entries, ttl }
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Shared cache in Redis, entries written with `SETEX`
pub struct RedisCache {
    // ConnectionManager needs &mut for queries
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    ttl: Duration,
}

impl RedisCache {
    pub async fn new(redis_url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            ttl,
        })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.redis.lock().await;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(self.ttl.as_secs().max(1))
            .arg(value)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.redis.lock().await;
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Multi-tier cache manager
///
/// L1 is always the in-process moka cache; L2 is an optional shared
/// backend (Redis in production). Reads fall through L1 → L2 and promote
/// L2 hits into L1. L2 failures are logged and treated as misses.
pub struct CacheManager {
    l1: LocalCache,
    l2: Option<Arc<dyn CacheBackend>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    /// Local-only cache
    pub fn local(l1_size: u64, ttl: Duration) -> Self {
        Self {
            l1: LocalCache::new(l1_size, ttl),
            l2: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// L1 in front of a shared backend
    pub fn tiered(l1_size: u64, ttl: Duration, l2: Arc<dyn CacheBackend>) -> Self {
        Self {
            l2: Some(l2),
            ..Self::local(l1_size, ttl)
        }
    }

    /// Get a typed value (L1 first, then L2)
    pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Set a typed value in every tier
    pub async fn set_json<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        self.set(key, serde_json::to_vec(value)?).await
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            l1_size: self.l1.entry_count(),
            hit_count: hits,
            miss_count: misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }
}

#[async_trait]
impl CacheBackend for CacheManager {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if let Some(bytes) = self.l1.get(key).await? {
            tracing::trace!("L1 cache hit: {}", key);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(bytes));
        }

        if let Some(l2) = &self.l2 {
            match l2.get(key).await {
                Ok(Some(bytes)) => {
                    tracing::trace!("L2 cache hit: {}", key);
                    self.l1.set(key, bytes.clone()).await?;
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(bytes));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("L2 cache read failed for {}: {}", key, e),
            }
        }

        tracing::trace!("Cache miss: {}", key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.set(key, value.clone()).await {
                tracing::warn!("L2 cache write failed for {}: {}", key, e);
            }
        }
        self.l1.set(key, value).await?;
        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.l1.delete(key).await?;
        if let Some(l2) = &self.l2 {
            l2.delete(key).await?;
        }
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.l1.ttl()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub l1_size: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Build a cache key for an entity's embeddings, e.g. `opportunity_N123`
    pub fn embedding(kind: &str, entity_id: &str) -> String {
        format!("{}_{}", kind, entity_id)
    }

    /// Build a cache key for a tenant's component weight
    pub fn weight(tenant_id: &str, component: &str) -> String {
        format!("weight:{}:{}", tenant_id, component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_set_get() {
        let cache = RedisCache::new("redis://127.0.0.1:6379", Duration::from_secs(60))
            .await
            .expect("Failed to create cache");

        cache.set("test_key", b"test_value".to_vec()).await.unwrap();
        let result = cache.get("test_key").await.unwrap();
        assert_eq!(result.as_deref(), Some(&b"test_value"[..]));

        cache.delete("test_key").await.unwrap();
        assert!(cache.get("test_key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_cache_round_trip_and_stats() {
        let cache = CacheManager::local(100, Duration::from_secs(60));

        assert!(cache.get_json::<Vec<f32>>("k").await.unwrap().is_none());
        cache.set_json("k", &vec![1.0f32, 2.0]).await.unwrap();
        assert_eq!(cache.get_json::<Vec<f32>>("k").await.unwrap(), Some(vec![1.0, 2.0]));

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_rate, 0.5);

        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_cache_expires() {
        let cache = LocalCache::new(10, Duration::from_millis(50));
        cache.set("k", vec![1]).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tiered_promotes_l2_hits() {
        let l2 = Arc::new(LocalCache::new(10, Duration::from_secs(60)));
        l2.set("shared", vec![7]).await.unwrap();

        let cache = CacheManager::tiered(10, Duration::from_secs(60), l2.clone());
        assert_eq!(cache.get("shared").await.unwrap(), Some(vec![7]));
        // Now served from L1 even if L2 forgets it
        l2.delete("shared").await.unwrap();
        assert_eq!(cache.get("shared").await.unwrap(), Some(vec![7]));
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::embedding("opportunity", "N1"), "opportunity_N1");
        assert_eq!(CacheKey::weight("t1", "naics_alignment"), "weight:t1:naics_alignment");
    }
}
