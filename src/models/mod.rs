// Model exports
pub mod domain;
pub mod normalize;
pub mod requests;
pub mod responses;

pub use domain::{CompanyProfile, ConfidenceLevel, Location, Match, Opportunity, PairKey};
pub use requests::{BatchRequest, PairRequest, RankRequest};
pub use responses::{BatchResponse, ErrorResponse, FilterResponse, HealthResponse, ScoreResponse};
