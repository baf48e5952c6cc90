use actix_web::{web, HttpResponse, Responder};
use std::time::Instant;
use validator::Validate;

use crate::core::{BatchOptions, MatchPipeline};
use crate::models::{
    BatchRequest, BatchResponse, CompanyProfile, ErrorResponse, FilterResponse, HealthResponse, Opportunity,
    PairRequest, RankRequest, ScoreResponse,
};

/// Upper bound on per-request batch concurrency
const MAX_REQUEST_CONCURRENCY: usize = 64;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: MatchPipeline,
    pub max_concurrency: usize,
    /// Rank limit when the request gives none
    pub default_limit: usize,
}

/// Configure the `/matches` routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/filter", web::post().to(filter_pair))
        .route("/score", web::post().to(score_pair))
        .route("/batch", web::post().to(match_batch))
        .route("/rank", web::post().to(rank_for_company));
}

fn invalid(error: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::bad_request(error, message))
}

/// Normalise both sides of a validated pair request
fn normalize_pair(req: &PairRequest) -> Result<(Opportunity, CompanyProfile), HttpResponse> {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for pair request: {}", errors);
        return Err(invalid("Validation failed", errors.to_string()));
    }
    let (Some(raw_opportunity), Some(raw_company)) = (&req.opportunity, &req.company) else {
        return Err(invalid("Validation failed", "opportunity and company are required"));
    };

    let opportunity = Opportunity::from_json(raw_opportunity).map_err(|e| invalid("Invalid opportunity", e.to_string()))?;
    let company = CompanyProfile::from_json(raw_company).map_err(|e| invalid("Invalid company", e.to_string()))?;
    Ok((opportunity, company))
}

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding_provider: state.pipeline.semantic().store().provider_name().to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Quick-filter a single pair
///
/// POST /api/v1/matches/filter
///
/// Request body:
/// ```json
/// { "opportunity": { "notice_id": "..." }, "company": { "company_id": "..." } }
/// ```
async fn filter_pair(state: web::Data<AppState>, req: web::Json<PairRequest>) -> impl Responder {
    let (opportunity, company) = match normalize_pair(&req) {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    let result = state.pipeline.filter(&opportunity, &company);
    tracing::debug!(
        "Filtered {} x {}: potential={}",
        opportunity.notice_id,
        company.company_id,
        result.is_potential_match
    );

    HttpResponse::Ok().json(FilterResponse {
        opportunity_id: opportunity.notice_id,
        company_id: company.company_id,
        result,
    })
}

/// Score a single pair through the full pipeline
///
/// POST /api/v1/matches/score
async fn score_pair(state: web::Data<AppState>, req: web::Json<PairRequest>) -> impl Responder {
    let (opportunity, company) = match normalize_pair(&req) {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    let start = Instant::now();
    let result = state.pipeline.score_pair(&opportunity, &company).await;
    let processing_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    tracing::info!(
        "Scored {} x {}: {:.3} ({:?}) in {:.1}ms",
        result.opportunity_id,
        result.company_id,
        result.total_score,
        result.confidence_level,
        processing_time_ms
    );

    HttpResponse::Ok().json(ScoreResponse { result, processing_time_ms })
}

/// Score every opportunity against every company
///
/// POST /api/v1/matches/batch
///
/// Records that fail normalisation are reported in `rejected_inputs` and the
/// rest of the batch proceeds.
async fn match_batch(state: web::Data<AppState>, req: web::Json<BatchRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for batch request: {}", errors);
        return invalid("Validation failed", errors.to_string());
    }

    let mut rejected_inputs = Vec::new();
    let opportunities: Vec<Opportunity> = req
        .opportunities
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            Opportunity::from_json(raw)
                .map_err(|e| rejected_inputs.push(format!("opportunities[{}]: {}", i, e)))
                .ok()
        })
        .collect();
    let companies: Vec<CompanyProfile> = req
        .companies
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            CompanyProfile::from_json(raw)
                .map_err(|e| rejected_inputs.push(format!("companies[{}]: {}", i, e)))
                .ok()
        })
        .collect();

    if opportunities.is_empty() || companies.is_empty() {
        return invalid("Invalid batch", rejected_inputs.join("; "));
    }

    let concurrency = req
        .max_concurrency
        .unwrap_or(state.max_concurrency)
        .clamp(1, MAX_REQUEST_CONCURRENCY);
    let request_id = uuid::Uuid::new_v4();

    tracing::info!(
        "Batch {}: {} opportunities x {} companies (concurrency {})",
        request_id,
        opportunities.len(),
        companies.len(),
        concurrency
    );

    let outcome = state
        .pipeline
        .match_batch(opportunities, companies, &BatchOptions::new(concurrency))
        .await;

    HttpResponse::Ok().json(BatchResponse {
        request_id,
        total_pairs: outcome.total_pairs,
        completed: outcome.completed,
        failed: outcome.failed,
        skipped: outcome.skipped,
        results: outcome.results,
        rejected_inputs,
    })
}

/// Rank opportunities for one company
///
/// POST /api/v1/matches/rank
async fn rank_for_company(state: web::Data<AppState>, req: web::Json<RankRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return invalid("Validation failed", errors.to_string());
    }
    let Some(raw_company) = &req.company else {
        return invalid("Validation failed", "company is required");
    };
    let company = match CompanyProfile::from_json(raw_company) {
        Ok(company) => company,
        Err(e) => return invalid("Invalid company", e.to_string()),
    };

    let opportunities: Vec<Opportunity> = req
        .opportunities
        .iter()
        .filter_map(|raw| match Opportunity::from_json(raw) {
            Ok(opportunity) => Some(opportunity),
            Err(e) => {
                tracing::debug!("Skipping opportunity for {}: {}", company.company_id, e);
                None
            }
        })
        .collect();

    let limit = req.limit.unwrap_or(state.default_limit);
    let ranked = state
        .pipeline
        .rank_for_company(&company, opportunities, limit, &BatchOptions::new(state.max_concurrency))
        .await;

    tracing::info!(
        "Ranked {} of {} candidates for {}",
        ranked.matches.len(),
        ranked.total_candidates,
        ranked.company_id
    );

    HttpResponse::Ok().json(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Aggregator, ConfidenceThresholds, QuickFilter, SemanticScorer};
    use crate::services::{EmbeddingStore, HashingEmbedder, InMemoryObjectStore, LocalCache, StaticWeights};
    use crate::routes::configure_routes;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        let store = Arc::new(EmbeddingStore::new(
            Arc::new(LocalCache::new(100, Duration::from_secs(60))),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(HashingEmbedder::new(64)),
            8000,
            Duration::from_secs(5),
        ));
        let aggregator = Aggregator::new(Arc::new(StaticWeights::default()), ConfidenceThresholds::default());
        AppState {
            pipeline: MatchPipeline::new(
                QuickFilter::new(),
                Arc::new(SemanticScorer::new(store, 20)),
                Arc::new(aggregator),
            ),
            max_concurrency: 4,
            default_limit: 1,
        }
    }

    fn opportunity() -> Value {
        json!({
            "NoticeId": "N1",
            "Title": "Cloud migration services",
            "Description": "Migrate legacy applications to a cloud platform",
            "NaicsCode": "541512"
        })
    }

    fn company() -> Value {
        json!({
            "company_id": "C1",
            "name": "Acme Cloud",
            "naics_codes": ["541512"],
            "capability_statement": "Cloud migration and application modernization"
        })
    }

    #[actix_web::test]
    async fn test_score_endpoint() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure_routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/matches/score")
            .set_json(json!({ "opportunity": opportunity(), "company": company() }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["match"]["opportunity_id"], "N1");
        assert_eq!(body["match"]["is_potential_match"], true);
        assert!(body["match"]["component_scores"]["naics_alignment"].is_object());
    }

    #[actix_web::test]
    async fn test_health_reports_provider() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure_routes)).await;
        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["embedding_provider"], "hashing");
    }

    #[actix_web::test]
    async fn test_score_missing_side_is_bad_request() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure_routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/matches/score")
            .set_json(json!({ "company": company() }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_batch_reports_rejected_inputs() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure_routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/matches/batch")
            .set_json(json!({
                "opportunities": [opportunity(), { "title": "no id" }],
                "companies": [company()]
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["total_pairs"], 1);
        assert_eq!(body["completed"], 1);
        assert_eq!(body["rejected_inputs"].as_array().map(Vec::len), Some(1));
    }

    #[actix_web::test]
    async fn test_empty_batch_is_bad_request() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure_routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/matches/batch")
            .set_json(json!({ "opportunities": [], "companies": [company()] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_rank_uses_configured_default_limit() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure_routes)).await;
        let mut second = opportunity();
        second["NoticeId"] = json!("N2");

        let req = test::TestRequest::post()
            .uri("/api/v1/matches/rank")
            .set_json(json!({ "company": company(), "opportunities": [opportunity(), second.clone()] }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_candidates"], 2);
        assert_eq!(body["matches"].as_array().map(Vec::len), Some(1));

        let req = test::TestRequest::post()
            .uri("/api/v1/matches/rank")
            .set_json(json!({ "company": company(), "opportunities": [opportunity(), second], "limit": 5 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["matches"].as_array().map(Vec::len), Some(2));
    }
}
