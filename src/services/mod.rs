// Service exports
pub mod cache;
pub mod embedding;
pub mod embedding_store;
pub mod object_store;
pub mod weights;

pub use cache::{CacheBackend, CacheError, CacheKey, CacheManager, CacheStats, LocalCache, RedisCache};
pub use embedding::{EmbeddingError, EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider};
pub use embedding_store::{
    EmbeddingStore, EmbeddingStoreStats, EntityEmbeddings, EntityKey, EntityKind, EntityTexts,
};
pub use object_store::{InMemoryObjectStore, ObjectStore, RedisObjectStore, StoreError};
pub use weights::{
    default_weight, resolve_weight, HttpWeightService, StaticWeights, WeightError, WeightSource,
    DEFAULT_WEIGHTS,
};
