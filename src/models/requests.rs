use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Request to filter or score a single pair
///
/// Both sides are raw feed records; they are normalised before scoring.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PairRequest {
    #[validate(required)]
    pub opportunity: Option<Value>,
    #[validate(required)]
    pub company: Option<Value>,
}

/// Request to score every opportunity against every company
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchRequest {
    #[validate(length(min = 1))]
    pub opportunities: Vec<Value>,
    #[validate(length(min = 1))]
    pub companies: Vec<Value>,
    #[serde(alias = "maxConcurrency")]
    pub max_concurrency: Option<usize>,
}

/// Request to rank opportunities for one company
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RankRequest {
    #[validate(required)]
    pub company: Option<Value>,
    #[validate(length(min = 1))]
    pub opportunities: Vec<Value>,
    /// Falls back to `matching.default_limit` when absent
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pair_request_requires_both_sides() {
        let req: PairRequest = serde_json::from_value(json!({ "company": { "company_id": "C1" } })).unwrap();
        assert!(req.validate().is_err());

        let req: PairRequest = serde_json::from_value(json!({
            "opportunity": { "notice_id": "N1" },
            "company": { "company_id": "C1" }
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_batch_request_rejects_empty_arrays() {
        let req: BatchRequest = serde_json::from_value(json!({
            "opportunities": [],
            "companies": [{ "company_id": "C1" }]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_rank_request_limit() {
        let req: RankRequest = serde_json::from_value(json!({
            "company": { "company_id": "C1" },
            "opportunities": [{ "notice_id": "N1" }]
        }))
        .unwrap();
        assert_eq!(req.limit, None);
        assert!(req.validate().is_ok());

        let req: RankRequest = serde_json::from_value(json!({
            "company": { "company_id": "C1" },
            "opportunities": [{ "notice_id": "N1" }],
            "limit": 0
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
