use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use govmatch::config::{LoggingSettings, Settings, StoreBackend};
use govmatch::core::{Aggregator, ConfidenceThresholds, MatchPipeline, QuickFilter, SemanticScorer};
use govmatch::routes::{self, matches::AppState};
use govmatch::services::{
    CacheBackend, CacheManager, EmbeddingProvider, EmbeddingStore, HashingEmbedder, HttpEmbeddingProvider,
    HttpWeightService, InMemoryObjectStore, ObjectStore, RedisCache, RedisObjectStore, StaticWeights, WeightSource,
};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Install the tracing subscriber from `[logging]`
///
/// `LOG_LEVEL` and `LOG_FORMAT` still override the configured values.
fn init_logging(logging: &LoggingSettings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

async fn build_cache(settings: &Settings) -> Arc<dyn CacheBackend> {
    let ttl = settings.cache.ttl();
    let l1_size = settings.cache.l1_capacity;

    let Some(redis_url) = settings.cache.redis_url.as_deref() else {
        info!("Embedding cache: local only (L1: {} entries, TTL: {}s)", l1_size, ttl.as_secs());
        return Arc::new(CacheManager::local(l1_size, ttl));
    };

    match RedisCache::new(redis_url, ttl).await {
        Ok(l2) => {
            info!("Embedding cache: local + redis (L1: {} entries, TTL: {}s)", l1_size, ttl.as_secs());
            Arc::new(CacheManager::tiered(l1_size, ttl, Arc::new(l2)))
        }
        Err(e) => {
            warn!("Failed to connect to Redis ({}), using local cache only", e);
            Arc::new(CacheManager::local(l1_size, ttl))
        }
    }
}

async fn build_store(settings: &Settings) -> Arc<dyn ObjectStore> {
    if settings.store.backend == StoreBackend::Redis {
        let url = settings.store.redis_url.as_deref().or(settings.cache.redis_url.as_deref());
        match url {
            Some(url) => match RedisObjectStore::new(url, settings.store.prefix.clone()).await {
                Ok(store) => {
                    info!("Embedding store: redis (prefix {})", settings.store.prefix);
                    return Arc::new(store);
                }
                Err(e) => warn!("Failed to open redis embedding store ({}), using memory", e),
            },
            None => warn!("store.backend = redis but no redis_url configured, using memory"),
        }
    }
    info!("Embedding store: memory");
    Arc::new(InMemoryObjectStore::new())
}

fn build_provider(settings: &Settings) -> std::io::Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &settings.embedding;
    match &embedding.endpoint {
        Some(endpoint) => {
            let provider = HttpEmbeddingProvider::new(
                endpoint.clone(),
                embedding.api_key.clone(),
                embedding.model.clone(),
                embedding.dimension,
                embedding.timeout(),
            )
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            info!("Embedding provider: {} ({})", endpoint, embedding.model);
            Ok(Arc::new(provider))
        }
        None => {
            info!("Embedding provider: offline hashing embedder");
            Ok(Arc::new(HashingEmbedder::default()))
        }
    }
}

fn build_weights(settings: &Settings) -> std::io::Result<Arc<dyn WeightSource>> {
    let weights = &settings.weights;
    match &weights.service_url {
        Some(url) => {
            let service = HttpWeightService::new(
                url.clone(),
                Duration::from_millis(weights.timeout_ms),
                Duration::from_secs(weights.cache_ttl_secs),
            )
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
            .with_fallback(StaticWeights::new(weights.defaults.clone(), weights.tenants.clone()))
            .with_failure_ttl(Duration::from_secs(weights.failure_ttl_secs));
            info!("Weight source: {} ({} configured tenant fallbacks)", url, weights.tenants.len());
            Ok(Arc::new(service))
        }
        None => {
            info!("Weight source: static ({} tenant overrides)", weights.tenants.len());
            Ok(Arc::new(StaticWeights::new(weights.defaults.clone(), weights.tenants.clone())))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(&LoggingSettings::default());
            error!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e));
        }
    };
    init_logging(&settings.logging);

    info!("Starting govmatch service...");
    info!("Configuration loaded successfully");

    let store = Arc::new(EmbeddingStore::new(
        build_cache(&settings).await,
        build_store(&settings).await,
        build_provider(&settings)?,
        settings.embedding.max_chars,
        settings.embedding.timeout(),
    ));

    let matching = &settings.matching;
    let aggregator = Aggregator::new(
        build_weights(&settings)?,
        ConfidenceThresholds::new(matching.high_threshold, matching.medium_threshold),
    );
    let pipeline = MatchPipeline::new(
        QuickFilter::new().with_all_checks(matching.run_all_checks),
        Arc::new(SemanticScorer::new(store, settings.embedding.max_chunks)),
        Arc::new(aggregator),
    );

    info!(
        "Pipeline initialized (thresholds {}/{}, concurrency {})",
        matching.high_threshold, matching.medium_threshold, matching.max_concurrency
    );

    let app_state = AppState {
        pipeline,
        max_concurrency: matching.max_concurrency,
        default_limit: matching.default_limit,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(
                web::JsonConfig::default()
                    .limit(16 * 1024 * 1024)
                    .error_handler(handle_json_payload_error),
            )
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
