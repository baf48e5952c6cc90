use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Application configuration
///
/// Every section has defaults, so an empty configuration is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub weights: WeightSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Shared L2 cache; local-only when unset
    pub redis_url: Option<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_ttl_secs(),
            l1_capacity: default_l1_capacity(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(1))
    }
}

fn default_ttl_secs() -> u64 { 3600 }
fn default_l1_capacity() -> u64 { 10_000 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// Redis URL for the redis backend; falls back to `cache.redis_url`
    pub redis_url: Option<String>,
    #[serde(default = "default_store_prefix")]
    pub prefix: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: None,
            prefix: default_store_prefix(),
        }
    }
}

fn default_store_backend() -> StoreBackend { StoreBackend::Memory }
fn default_store_prefix() -> String { "govmatch".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    /// OpenAI-compatible endpoint; the offline hashing embedder is used when unset
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: default_embedding_model(),
            dimension: default_dimension(),
            max_chars: default_max_chars(),
            timeout_secs: default_embedding_timeout_secs(),
            max_chunks: default_max_chunks(),
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_dimension() -> usize { 1536 }
fn default_max_chars() -> usize { 8000 }
fn default_embedding_timeout_secs() -> u64 { 10 }
fn default_max_chunks() -> usize { 20 }

#[derive(Debug, Clone, Deserialize)]
pub struct WeightSettings {
    /// Remote weight service; static weights are used when unset
    pub service_url: Option<String>,
    #[serde(default = "default_weight_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_weight_cache_secs")]
    pub cache_ttl_secs: u64,
    /// How long a failed service lookup is served from configured weights
    #[serde(default = "default_weight_failure_secs")]
    pub failure_ttl_secs: u64,
    /// Component → weight, overriding the built-in defaults
    #[serde(default)]
    pub defaults: HashMap<String, f64>,
    /// Tenant → component → weight
    #[serde(default)]
    pub tenants: HashMap<String, HashMap<String, f64>>,
}

impl Default for WeightSettings {
    fn default() -> Self {
        Self {
            service_url: None,
            timeout_ms: default_weight_timeout_ms(),
            cache_ttl_secs: default_weight_cache_secs(),
            failure_ttl_secs: default_weight_failure_secs(),
            defaults: HashMap::new(),
            tenants: HashMap::new(),
        }
    }
}

fn default_weight_timeout_ms() -> u64 { 500 }
fn default_weight_cache_secs() -> u64 { 60 }
fn default_weight_failure_secs() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: f64,
    #[serde(default)]
    pub run_all_checks: bool,
    #[serde(default = "default_rank_limit")]
    pub default_limit: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            run_all_checks: false,
            default_limit: default_rank_limit(),
        }
    }
}

fn default_max_concurrency() -> usize { 8 }
fn default_high_threshold() -> f64 { 0.7 }
fn default_medium_threshold() -> f64 { 0.4 }
fn default_rank_limit() -> usize { 20 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

fn environment() -> Environment {
    // e.g. GOVMATCH__MATCHING__MAX_CONCURRENCY -> matching.max_concurrency
    Environment::with_prefix("GOVMATCH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with GOVMATCH__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        substitute_env_vars(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        settings.try_deserialize()
    }
}

/// Pick up conventional secrets that are not namespaced under GOVMATCH__
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings.clone());

    if settings.get_string("embedding.api_key").is_err() {
        if let Ok(key) = env::var("EMBEDDING_API_KEY").or_else(|_| env::var("OPENAI_API_KEY")) {
            builder = builder.set_override("embedding.api_key", key)?;
        }
    }
    if settings.get_string("cache.redis_url").is_err() {
        if let Ok(url) = env::var("REDIS_URL") {
            builder = builder.set_override("cache.redis_url", url)?;
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.cache.ttl_secs, 3600);
        assert_eq!(settings.embedding.max_chars, 8000);
        assert_eq!(settings.embedding.timeout_secs, 10);
        assert_eq!(settings.embedding.max_chunks, 20);
        assert_eq!(settings.matching.max_concurrency, 8);
        assert_eq!(settings.matching.high_threshold, 0.7);
        assert_eq!(settings.matching.medium_threshold, 0.4);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert_eq!(settings.weights.failure_ttl_secs, 30);
    }

    #[test]
    fn test_default_logging() {
        let level = default_log_level();
        let format = default_log_format();
        assert_eq!(level, "info");
        assert_eq!(format, "json");
    }

    #[test]
    fn test_load_from_partial_file() {
        let path = std::env::temp_dir().join(format!("govmatch-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[matching]
max_concurrency = 3

[store]
backend = "redis"

[weights.tenants.acme]
naics_alignment = 0.4
"#
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.matching.max_concurrency, 3);
        assert_eq!(settings.matching.high_threshold, 0.7);
        assert_eq!(settings.store.backend, StoreBackend::Redis);
        assert_eq!(settings.weights.tenants["acme"]["naics_alignment"], 0.4);
        assert_eq!(settings.server.port, 8080);
    }
}
