use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{FilterResult, PairResult};
use crate::models::domain::Match;

/// Response for the filter endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResponse {
    pub opportunity_id: String,
    pub company_id: String,
    pub result: FilterResult,
}

/// Response for the score endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    #[serde(rename = "match")]
    pub result: Match,
    pub processing_time_ms: f64,
}

/// Response for the batch endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub request_id: Uuid,
    pub total_pairs: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<PairResult>,
    /// Records that could not be normalised, by position in the request
    pub rejected_inputs: Vec<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub embedding_provider: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl ErrorResponse {
    pub fn bad_request(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            status_code: 400,
        }
    }
}
