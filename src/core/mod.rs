// Core algorithm exports
pub mod filters;
pub mod industry;
pub mod matcher;
pub mod naics;
pub mod outcome;
pub mod scoring;
pub mod semantic;
pub mod signals;
pub mod similarity;
pub mod text;

pub use filters::{CheckResult, FilterCheck, FilterResult, QuickFilter};
pub use matcher::{BatchOptions, BatchOutcome, CancellationToken, MatchPipeline, PairResult, RankedMatches};
pub use naics::{AlignmentResult, MatchLevel, NaicsAligner};
pub use outcome::{ComponentOutcome, ComponentScore, ComponentStatus, DegradeReason, ErrorKind, ScoringError};
pub use scoring::{Aggregator, ConfidenceThresholds};
pub use semantic::{SemanticScorer, SimilarityResult};
pub use signals::SignalScorer;
pub use similarity::cosine_similarity;
