use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::cache::{CacheBackend, CacheKey};
use super::embedding::{fnv1a, EmbeddingError, EmbeddingProvider};
use super::object_store::{ObjectStore, StoreError};

/// Which side of a match an embedding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Opportunity,
    Company,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Opportunity => "opportunity",
            EntityKind::Company => "company",
        }
    }
}

/// Identity of a stored embedding set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
    pub tenant_id: String,
}

impl EntityKey {
    pub fn opportunity(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Opportunity,
            id: id.into(),
            tenant_id: String::new(),
        }
    }

    pub fn company(tenant_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Company,
            id: id.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Key in the TTL cache: `"opportunity_{id}"`, or
    /// `"company_{tenant}/{id}"` since company profiles are tenant-owned
    pub fn cache_key(&self) -> String {
        match self.kind {
            EntityKind::Opportunity => CacheKey::embedding(self.kind.as_str(), &self.id),
            EntityKind::Company => CacheKey::embedding(
                self.kind.as_str(),
                &format!("{}/{}", urlencoding::encode(&self.tenant_id), urlencoding::encode(&self.id)),
            ),
        }
    }

    /// Path in the persistent object store
    pub fn store_path(&self) -> String {
        let id = urlencoding::encode(&self.id);
        match self.kind {
            EntityKind::Opportunity => format!("embeddings/opportunities/{}.json", id),
            EntityKind::Company => format!(
                "embeddings/{}/companies/{}.json",
                urlencoding::encode(&self.tenant_id),
                id
            ),
        }
    }
}

/// Source texts to embed for one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTexts {
    pub full: String,
    pub sections: BTreeMap<String, String>,
    pub chunks: Vec<String>,
}

impl EntityTexts {
    /// Content hash of every field, hex encoded
    pub fn fingerprint(&self) -> String {
        let mut buf = String::with_capacity(self.full.len() + 64);
        buf.push_str(&self.full);
        for (name, text) in &self.sections {
            buf.push('\u{1f}');
            buf.push_str(name);
            buf.push('\u{1e}');
            buf.push_str(text);
        }
        for chunk in &self.chunks {
            buf.push('\u{1d}');
            buf.push_str(chunk);
        }
        format!("{:016x}", fnv1a(buf.as_bytes()))
    }
}

/// Embeddings for one entity
///
/// Failed fields hold an empty vector, which every similarity treats as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEmbeddings {
    pub full: Vec<f32>,
    pub sections: BTreeMap<String, Vec<f32>>,
    pub chunks: Vec<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub fingerprint: String,
}

impl EntityEmbeddings {
    pub fn empty(fingerprint: String) -> Self {
        Self {
            full: Vec::new(),
            sections: BTreeMap::new(),
            chunks: Vec::new(),
            created_at: Utc::now(),
            fingerprint,
        }
    }

    pub fn has_full(&self) -> bool {
        !self.full.is_empty()
    }

    pub fn has_sections(&self) -> bool {
        self.sections.values().any(|v| !v.is_empty())
    }

    pub fn has_chunks(&self) -> bool {
        self.chunks.iter().any(|v| !v.is_empty())
    }

    /// Fraction of {full, sections, chunks} with at least one vector
    pub fn coverage(&self) -> f64 {
        let populated = [self.has_full(), self.has_sections(), self.has_chunks()]
            .iter()
            .filter(|p| **p)
            .count();
        populated as f64 / 3.0
    }

    pub fn is_empty(&self) -> bool {
        !self.has_full() && !self.has_sections() && !self.has_chunks()
    }
}

/// Store statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EmbeddingStoreStats {
    pub cache_hits: u64,
    pub store_hits: u64,
    pub generations: u64,
    pub provider_calls: u64,
    pub provider_failures: u64,
    /// Keys currently being loaded or generated
    pub in_flight: usize,
}

/// Cache-then-store-then-generate lookup for entity embeddings
///
/// Lookups check the TTL cache, then the persistent store, and only on a
/// double miss call the embedding provider once per populated field.
/// Concurrent callers for the same key queue on a per-key lock; whoever
/// arrives second re-reads the cache instead of generating again. A lock
/// lives exactly as long as someone holds or waits on it.
pub struct EmbeddingStore {
    cache: Arc<dyn CacheBackend>,
    store: Arc<dyn ObjectStore>,
    provider: Arc<dyn EmbeddingProvider>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    max_chars: usize,
    timeout: Duration,
    cache_hits: AtomicU64,
    store_hits: AtomicU64,
    generations: AtomicU64,
    provider_calls: AtomicU64,
    provider_failures: AtomicU64,
}

impl EmbeddingStore {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn EmbeddingProvider>,
        max_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            provider,
            in_flight: DashMap::new(),
            max_chars,
            timeout,
            cache_hits: AtomicU64::new(0),
            store_hits: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Return embeddings for `key`, generating them at most once per TTL
    /// window. Never fails: provider problems yield empty vectors.
    pub async fn get_or_create(&self, key: &EntityKey, texts: &EntityTexts) -> EntityEmbeddings {
        let fingerprint = texts.fingerprint();
        let cache_key = key.cache_key();

        if let Some(hit) = self.from_cache(&cache_key, &fingerprint).await {
            return hit;
        }

        let lock = self.key_lock(&cache_key);
        let loaded = {
            let _guard = lock.lock().await;
            self.load_or_generate(key, texts, &cache_key, fingerprint).await
        };
        self.release_key_lock(&cache_key, lock);
        loaded
    }

    /// Second half of [`EmbeddingStore::get_or_create`], run under the key lock
    async fn load_or_generate(
        &self,
        key: &EntityKey,
        texts: &EntityTexts,
        cache_key: &str,
        fingerprint: String,
    ) -> EntityEmbeddings {
        // Another caller may have finished while we waited
        if let Some(hit) = self.from_cache(cache_key, &fingerprint).await {
            return hit;
        }

        if let Some(stored) = self.from_store(key, &fingerprint).await {
            self.store_hits.fetch_add(1, Ordering::Relaxed);
            self.write_cache(cache_key, &stored).await;
            return stored;
        }

        let generated = self.generate(key, texts, fingerprint).await;
        if generated.is_empty() {
            tracing::warn!(
                "No embeddings generated for {} {}; result not cached",
                key.kind.as_str(),
                key.id
            );
            return generated;
        }

        self.persist(key, &generated).await;
        self.write_cache(cache_key, &generated).await;
        generated
    }

    fn key_lock(&self, cache_key: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once the last holder is done with it
    fn release_key_lock(&self, cache_key: &str, lock: Arc<Mutex<()>>) {
        // Shard lock is held here, so no new waiter can clone the entry meanwhile
        self.in_flight
            .remove_if(cache_key, |_, current| Arc::ptr_eq(current, &lock) && Arc::strong_count(&lock) == 2);
    }

    /// Drop cached and persisted embeddings so the next lookup regenerates
    pub async fn refresh(&self, key: &EntityKey) -> Result<(), StoreError> {
        let cache_key = key.cache_key();
        let lock = self.key_lock(&cache_key);
        let deleted = {
            let _guard = lock.lock().await;
            self.invalidate(key).await;
            self.store.delete(&key.store_path()).await
        };
        self.release_key_lock(&cache_key, lock);

        deleted?;
        tracing::info!("Refreshed embeddings for {} {}", key.kind.as_str(), key.id);
        Ok(())
    }

    /// Drop the cached copy only
    pub async fn invalidate(&self, key: &EntityKey) {
        if let Err(e) = self.cache.delete(&key.cache_key()).await {
            tracing::warn!("Failed to invalidate cached embeddings {}: {}", key.cache_key(), e);
        }
    }

    pub fn stats(&self) -> EmbeddingStoreStats {
        EmbeddingStoreStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }

    async fn from_cache(&self, cache_key: &str, fingerprint: &str) -> Option<EntityEmbeddings> {
        let bytes = match self.cache.get(cache_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Embedding cache read failed for {}: {}", cache_key, e);
                return None;
            }
        };

        match serde_json::from_slice::<EntityEmbeddings>(&bytes) {
            Ok(hit) if hit.fingerprint == fingerprint => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(hit)
            }
            Ok(_) => {
                tracing::debug!("Cached embeddings for {} are stale", cache_key);
                None
            }
            Err(e) => {
                tracing::warn!("Corrupt cached embeddings for {}: {}", cache_key, e);
                None
            }
        }
    }

    async fn from_store(&self, key: &EntityKey, fingerprint: &str) -> Option<EntityEmbeddings> {
        let path = key.store_path();
        let bytes = match self.store.get(&path).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => return None,
            Err(e) => {
                tracing::warn!("Object store read failed for {}: {}", path, e);
                return None;
            }
        };

        match serde_json::from_slice::<EntityEmbeddings>(&bytes) {
            Ok(stored) if stored.fingerprint == fingerprint => Some(stored),
            Ok(_) => {
                tracing::debug!("Stored embeddings at {} are stale", path);
                None
            }
            Err(e) => {
                tracing::warn!("Corrupt stored embeddings at {}: {}", path, e);
                None
            }
        }
    }

    async fn write_cache(&self, cache_key: &str, embeddings: &EntityEmbeddings) {
        let bytes = match serde_json::to_vec(embeddings) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to serialize embeddings for {}: {}", cache_key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(cache_key, bytes).await {
            tracing::warn!("Embedding cache write failed for {}: {}", cache_key, e);
        }
    }

    async fn persist(&self, key: &EntityKey, embeddings: &EntityEmbeddings) {
        let path = key.store_path();
        let result = match serde_json::to_vec(embeddings) {
            Ok(bytes) => self.store.put(&path, bytes).await,
            Err(e) => Err(StoreError::from(e)),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist embeddings to {}: {}", path, e);
        }
    }

    async fn generate(&self, key: &EntityKey, texts: &EntityTexts, fingerprint: String) -> EntityEmbeddings {
        self.generations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Generating embeddings for {} {} ({} sections, {} chunks)",
            key.kind.as_str(),
            key.id,
            texts.sections.len(),
            texts.chunks.len()
        );

        let section_names: Vec<&String> = texts.sections.keys().collect();
        let (full, sections, chunks) = tokio::join!(
            self.embed_one(&texts.full),
            join_all(texts.sections.values().map(|text| self.embed_one(text))),
            join_all(texts.chunks.iter().map(|text| self.embed_one(text))),
        );

        let mut embeddings = EntityEmbeddings::empty(fingerprint);
        embeddings.full = full;
        embeddings.sections = section_names
            .into_iter()
            .cloned()
            .zip(sections)
            .collect();
        embeddings.chunks = chunks;
        embeddings
    }

    async fn embed_one(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        let embedded = tokio::time::timeout(self.timeout, self.provider.embed(text, self.max_chars))
            .await
            .unwrap_or(Err(EmbeddingError::Timeout(self.timeout)));
        match embedded {
            Ok(vector) => vector,
            Err(e) => {
                self.provider_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Embedding provider {} failed: {}", self.provider.name(), e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::LocalCache;
    use crate::services::embedding::HashingEmbedder;
    use crate::services::object_store::InMemoryObjectStore;
    use async_trait::async_trait;

    struct CountingProvider {
        inner: HashingEmbedder,
        calls: AtomicU64,
        delay: Duration,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str, max_chars: usize) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.inner.embed_sync(text, max_chars)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn texts() -> EntityTexts {
        EntityTexts {
            full: "Cloud migration services for federal agencies".to_string(),
            sections: BTreeMap::from([("title".to_string(), "Cloud migration".to_string())]),
            chunks: vec!["Migrate legacy workloads to the cloud".to_string()],
        }
    }

    fn build(delay: Duration, timeout: Duration) -> (Arc<CountingProvider>, Arc<InMemoryObjectStore>, EmbeddingStore) {
        let provider = Arc::new(CountingProvider {
            inner: HashingEmbedder::new(64),
            calls: AtomicU64::new(0),
            delay,
        });
        let store = Arc::new(InMemoryObjectStore::new());
        let cache = Arc::new(LocalCache::new(100, Duration::from_secs(3600)));
        let embeddings = EmbeddingStore::new(cache, store.clone(), provider.clone(), 8000, timeout);
        (provider, store, embeddings)
    }

    #[test]
    fn test_key_paths() {
        assert_eq!(EntityKey::opportunity("N 1").cache_key(), "opportunity_N 1");
        assert_eq!(
            EntityKey::opportunity("N 1").store_path(),
            "embeddings/opportunities/N%201.json"
        );
        assert_eq!(
            EntityKey::company("acme/gov", "C1").store_path(),
            "embeddings/acme%2Fgov/companies/C1.json"
        );
        assert_eq!(EntityKey::company("acme/gov", "C1").cache_key(), "company_acme%2Fgov/C1");
    }

    #[tokio::test]
    async fn test_company_embeddings_are_tenant_scoped() {
        let (provider, _store, embeddings) = build(Duration::ZERO, Duration::from_secs(5));

        embeddings.get_or_create(&EntityKey::company("t1", "C1"), &texts()).await;
        embeddings.get_or_create(&EntityKey::company("t2", "C1"), &texts()).await;

        assert_eq!(embeddings.stats().generations, 2);
        assert_eq!(embeddings.stats().cache_hits, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_fingerprint_tracks_text() {
        let a = texts();
        let mut b = texts();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.chunks.push("another chunk".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn test_generates_once_then_hits_cache() {
        let (provider, store, embeddings) = build(Duration::ZERO, Duration::from_secs(5));
        let key = EntityKey::opportunity("N1");

        let first = embeddings.get_or_create(&key, &texts()).await;
        assert_eq!(first.coverage(), 1.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.len().await, 1);

        let second = embeddings.get_or_create(&key, &texts()).await;
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(embeddings.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_reads_through_to_store_after_cache_invalidation() {
        let (provider, _store, embeddings) = build(Duration::ZERO, Duration::from_secs(5));
        let key = EntityKey::company("t1", "C1");

        embeddings.get_or_create(&key, &texts()).await;
        embeddings.invalidate(&key).await;
        embeddings.get_or_create(&key, &texts()).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(embeddings.stats().store_hits, 1);
    }

    #[tokio::test]
    async fn test_refresh_forces_regeneration() {
        let (provider, store, embeddings) = build(Duration::ZERO, Duration::from_secs(5));
        let key = EntityKey::opportunity("N1");

        embeddings.get_or_create(&key, &texts()).await;
        embeddings.refresh(&key).await.unwrap();
        assert!(store.is_empty().await);

        embeddings.get_or_create(&key, &texts()).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_changed_text_regenerates() {
        let (provider, _store, embeddings) = build(Duration::ZERO, Duration::from_secs(5));
        let key = EntityKey::opportunity("N1");

        embeddings.get_or_create(&key, &texts()).await;
        let mut updated = texts();
        updated.full = "Janitorial services for a regional office".to_string();
        embeddings.get_or_create(&key, &updated).await;

        assert_eq!(embeddings.stats().generations, 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_generation() {
        let (provider, _store, embeddings) = build(Duration::from_millis(50), Duration::from_secs(5));
        let embeddings = Arc::new(embeddings);
        let key = EntityKey::opportunity("N-shared");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let embeddings = embeddings.clone();
                let key = key.clone();
                tokio::spawn(async move { embeddings.get_or_create(&key, &texts()).await })
            })
            .collect();

        let results: Vec<EntityEmbeddings> = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(embeddings.stats().generations, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(results.iter().all(|r| r == &results[0]));
        // Locks are dropped once every caller is through
        assert_eq!(embeddings.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_empty_vectors() {
        let (_provider, store, embeddings) = build(Duration::from_millis(200), Duration::from_millis(20));
        let key = EntityKey::opportunity("N-slow");

        let result = embeddings.get_or_create(&key, &texts()).await;
        assert!(result.is_empty());
        assert_eq!(result.coverage(), 0.0);
        assert_eq!(embeddings.stats().provider_failures, 3);
        // Empty results are neither cached nor persisted
        assert!(store.is_empty().await);
    }
}
