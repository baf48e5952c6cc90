use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::cache::CacheKey;

/// Hardcoded component weights, used whenever configuration is silent or
/// the weight service is unavailable
pub const DEFAULT_WEIGHTS: &[(&str, f64)] = &[
    ("quick_filter", 0.10),
    ("naics_alignment", 0.15),
    ("semantic_similarity", 0.25),
    ("past_performance", 0.15),
    ("certification_bonus", 0.10),
    ("geographic_match", 0.10),
    ("capacity_fit", 0.10),
    ("recency_factor", 0.05),
];

/// Weight for a component missing from [`DEFAULT_WEIGHTS`]
pub const FALLBACK_WEIGHT: f64 = 0.10;

/// How long a failed remote lookup is remembered
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(30);

pub fn default_weight(component: &str) -> f64 {
    DEFAULT_WEIGHTS
        .iter()
        .find(|(name, _)| *name == component)
        .map_or(FALLBACK_WEIGHT, |(_, w)| *w)
}

/// Errors that can occur when looking up component weights
#[derive(Debug, Error)]
pub enum WeightError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Weight service returned error: {0}")]
    ApiError(String),

    #[error("No weight configured for {component} (tenant {tenant})")]
    NotFound { component: String, tenant: String },

    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
}

/// External configuration collaborator for per-tenant weights
#[async_trait]
pub trait WeightSource: Send + Sync {
    async fn get_weight(&self, component: &str, tenant_id: &str) -> Result<f64, WeightError>;
}

fn validate(weight: f64) -> Result<f64, WeightError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(weight)
    } else {
        Err(WeightError::InvalidWeight(weight.to_string()))
    }
}

/// Weights from configuration: tenant override, then configured default,
/// then the hardcoded table
#[derive(Debug, Clone, Default)]
pub struct StaticWeights {
    defaults: HashMap<String, f64>,
    tenants: HashMap<String, HashMap<String, f64>>,
}

impl StaticWeights {
    pub fn new(defaults: HashMap<String, f64>, tenants: HashMap<String, HashMap<String, f64>>) -> Self {
        Self { defaults, tenants }
    }

    /// Set a single tenant override
    pub fn with_tenant_weight(mut self, tenant_id: &str, component: &str, weight: f64) -> Self {
        self.tenants
            .entry(tenant_id.to_string())
            .or_default()
            .insert(component.to_string(), weight);
        self
    }
}

#[async_trait]
impl WeightSource for StaticWeights {
    async fn get_weight(&self, component: &str, tenant_id: &str) -> Result<f64, WeightError> {
        let configured = self
            .tenants
            .get(tenant_id)
            .and_then(|t| t.get(component))
            .or_else(|| self.defaults.get(component));

        match configured {
            Some(weight) => validate(*weight),
            None if DEFAULT_WEIGHTS.iter().any(|(name, _)| *name == component) => {
                Ok(default_weight(component))
            }
            None => Err(WeightError::NotFound {
                component: component.to_string(),
                tenant: tenant_id.to_string(),
            }),
        }
    }
}

/// Remote weight service
///
/// `GET {base_url}/weights/{tenant}/{component}` returning either a bare
/// number or `{"weight": n}`. Answers are cached briefly in-process.
/// When the service has no answer the configured [`StaticWeights`] are
/// consulted, and the miss is remembered for `failure_ttl` so an outage
/// costs one request per key rather than one per pair.
pub struct HttpWeightService {
    base_url: String,
    client: Client,
    cache: moka::future::Cache<String, f64>,
    misses: moka::future::Cache<String, ()>,
    fallback: StaticWeights,
}

impl HttpWeightService {
    pub fn new(base_url: String, timeout: Duration, cache_ttl: Duration) -> Result<Self, WeightError> {
        let client = Client::builder().timeout(timeout).build()?;
        let cache = moka::future::CacheBuilder::new(10_000)
            .time_to_live(cache_ttl)
            .build();
        Ok(Self {
            base_url,
            client,
            cache,
            misses: Self::miss_cache(DEFAULT_FAILURE_TTL),
            fallback: StaticWeights::default(),
        })
    }

    /// Weights used when the service cannot answer
    pub fn with_fallback(mut self, fallback: StaticWeights) -> Self {
        self.fallback = fallback;
        self
    }

    /// How long a failed lookup is remembered
    pub fn with_failure_ttl(mut self, failure_ttl: Duration) -> Self {
        self.misses = Self::miss_cache(failure_ttl);
        self
    }

    fn miss_cache(ttl: Duration) -> moka::future::Cache<String, ()> {
        moka::future::CacheBuilder::new(10_000)
            .time_to_live(ttl.max(Duration::from_millis(1)))
            .build()
    }

    async fn fetch(&self, component: &str, tenant_id: &str) -> Result<f64, WeightError> {
        let url = format!(
            "{}/weights/{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(tenant_id),
            urlencoding::encode(component)
        );

        tracing::debug!("Fetching weight from: {}", url);

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(WeightError::NotFound {
                    component: component.to_string(),
                    tenant: tenant_id.to_string(),
                })
            }
            status if !status.is_success() => {
                return Err(WeightError::ApiError(format!("Failed to fetch weight: {}", status)))
            }
            _ => {}
        }

        let json: Value = response.json().await?;
        let weight = json
            .as_f64()
            .or_else(|| json.get("weight").and_then(Value::as_f64))
            .ok_or_else(|| WeightError::InvalidWeight(json.to_string()))?;
        validate(weight)
    }
}

#[async_trait]
impl WeightSource for HttpWeightService {
    async fn get_weight(&self, component: &str, tenant_id: &str) -> Result<f64, WeightError> {
        let key = CacheKey::weight(tenant_id, component);
        if let Some(weight) = self.cache.get(&key).await {
            return Ok(weight);
        }
        if self.misses.contains_key(&key) {
            return self.fallback.get_weight(component, tenant_id).await;
        }

        match self.fetch(component, tenant_id).await {
            Ok(weight) => {
                self.cache.insert(key, weight).await;
                Ok(weight)
            }
            Err(e) => {
                match &e {
                    WeightError::NotFound { .. } => {
                        tracing::debug!("Weight service has no {} for tenant {}", component, tenant_id)
                    }
                    _ => tracing::warn!(
                        "Weight service lookup failed for {} (tenant {}): {}; using configured weights",
                        component,
                        tenant_id,
                        e
                    ),
                }
                self.misses.insert(key, ()).await;
                self.fallback.get_weight(component, tenant_id).await
            }
        }
    }
}

/// Look up a weight, falling back to the hardcoded default on any failure
pub async fn resolve_weight(source: &dyn WeightSource, component: &str, tenant_id: &str) -> f64 {
    match source.get_weight(component, tenant_id).await {
        Ok(weight) => weight,
        Err(WeightError::NotFound { .. }) => {
            tracing::debug!("No weight for {} (tenant {}); using default", component, tenant_id);
            default_weight(component)
        }
        Err(e) => {
            tracing::warn!(
                "Weight lookup failed for {} (tenant {}): {}; using default",
                component,
                tenant_id,
                e
            );
            default_weight(component)
        }
    }
}
