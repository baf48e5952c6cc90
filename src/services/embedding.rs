use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::core::similarity::normalize;
use crate::core::text::truncate_chars;

/// Errors that can occur when generating embeddings
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Provider returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Nothing to embed")]
    EmptyInput,
}

/// External text-embedding collaborator
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text`, truncated to `max_chars` characters, as a unit-length
    /// vector of [`EmbeddingProvider::dimension`] floats
    async fn embed(&self, text: &str, max_chars: usize) -> Result<Vec<f32>, EmbeddingError>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// OpenAI-compatible embeddings endpoint
///
/// Sends `{"model", "input", "dimensions"}` and reads
/// `data[0].embedding` (or a bare `embedding` array) from the reply.
pub struct HttpEmbeddingProvider {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    client: Client,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            api_key,
            model,
            dimension,
            client,
        })
    }
}

fn parse_embedding(json: &Value) -> Result<Vec<f32>, EmbeddingError> {
    let values = json
        .pointer("/data/0/embedding")
        .or_else(|| json.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| EmbeddingError::InvalidResponse("Missing embedding array".into()))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::InvalidResponse("Non-numeric embedding value".into()))
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str, max_chars: usize) -> Result<Vec<f32>, EmbeddingError> {
        let input = truncate_chars(text.trim(), max_chars);
        if input.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "input": input,
            "dimensions": self.dimension,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(EmbeddingError::ApiError(format!("{status}: {body}")));
        }

        let json: Value = response.json().await?;
        let mut vector = parse_embedding(&json)?;
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 64-bit FNV-1a
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| (hash ^ *b as u64).wrapping_mul(PRIME))
}

/// Offline, deterministic embedder: feature-hashed bag of words with
/// adjacent-word bigrams, L2-normalised
///
/// Used when no provider endpoint is configured and in tests. Texts sharing
/// vocabulary land close together; unrelated texts are near-orthogonal.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn bump(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let idx = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign * weight;
    }

    pub fn embed_sync(&self, text: &str, max_chars: usize) -> Result<Vec<f32>, EmbeddingError> {
        let input = truncate_chars(text, max_chars).to_lowercase();
        let words: Vec<&str> = input
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 3)
            .collect();
        if words.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in &words {
            self.bump(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            self.bump(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str, max_chars: usize) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_sync(text, max_chars)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
