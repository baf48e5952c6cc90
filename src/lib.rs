//! govmatch - Government contract opportunity matching
//!
//! Scores how well a company fits a contract opportunity. Each pair goes
//! through a staged pipeline: a cheap rule-based quick filter, NAICS code
//! alignment, embedding-based semantic similarity and a handful of
//! supplementary signals, combined into a weighted [`Match`] with a
//! confidence level.
//!
//! Components never fail the whole match. A component that cannot run
//! reports a degraded or failed status and the aggregate is renormalised
//! over the rest.

pub mod config;
pub mod core;
pub mod data;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    Aggregator, BatchOptions, BatchOutcome, CancellationToken, ConfidenceThresholds, FilterResult, MatchPipeline,
    NaicsAligner, QuickFilter, SemanticScorer,
};
pub use models::{CompanyProfile, ConfidenceLevel, Match, Opportunity};
