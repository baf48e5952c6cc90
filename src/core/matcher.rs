use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::filters::{FilterResult, QuickFilter};
use crate::core::naics::NaicsAligner;
use crate::core::outcome::ComponentScore;
use crate::core::scoring::{Aggregator, QUICK_FILTER};
use crate::core::semantic::SemanticScorer;
use crate::core::signals::SignalScorer;
use crate::models::{CompanyProfile, Match, Opportunity, PairKey};

pub const NAICS_ALIGNMENT: &str = "naics_alignment";
pub const SEMANTIC_SIMILARITY: &str = "semantic_similarity";

/// Cooperative cancellation token shared between a batch and its caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Stop issuing new work. Pairs already running finish normally.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Knobs for a batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_concurrency: usize,
    pub cancel: CancellationToken,
}

impl BatchOptions {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Result for one pair in a batch. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResult {
    pub opportunity_id: String,
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Match>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PairResult {
    fn scored(pair: PairKey, result: Match) -> Self {
        Self {
            opportunity_id: pair.opportunity_id,
            company_id: pair.company_id,
            result: Some(result),
            error: None,
        }
    }

    fn failed(pair: PairKey, error: String) -> Self {
        Self {
            opportunity_id: pair.opportunity_id,
            company_id: pair.company_id,
            result: None,
            error: Some(error),
        }
    }
}

/// Outcome of an N×M batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Completed and failed pairs, ordered by (opportunity_id, company_id)
    pub results: Vec<PairResult>,
    pub total_pairs: usize,
    pub completed: usize,
    pub failed: usize,
    /// Pairs never issued because the batch was cancelled
    pub skipped: usize,
    pub cancelled: bool,
}

/// Opportunities ranked for one company
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMatches {
    pub company_id: String,
    pub matches: Vec<Match>,
    pub total_candidates: usize,
    pub potential_matches: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Main matching orchestrator
///
/// # Pipeline Stages
/// 1. Quick filter (critical failures stop here)
/// 2. NAICS alignment
/// 3. Semantic similarity (the only stage with I/O)
/// 4. Supplementary signals
/// 5. Weighted aggregation
///
/// Cheap to clone; every clone shares the same embedding store and weight
/// source.
#[derive(Clone)]
pub struct MatchPipeline {
    filter: QuickFilter,
    aligner: NaicsAligner,
    semantic: Arc<SemanticScorer>,
    signals: SignalScorer,
    aggregator: Arc<Aggregator>,
}

impl MatchPipeline {
    pub fn new(filter: QuickFilter, semantic: Arc<SemanticScorer>, aggregator: Arc<Aggregator>) -> Self {
        Self {
            filter,
            aligner: NaicsAligner::new(),
            semantic,
            signals: SignalScorer::new(),
            aggregator,
        }
    }

    pub fn semantic(&self) -> &SemanticScorer {
        &self.semantic
    }

    /// Quick filter only
    pub fn filter(&self, opportunity: &Opportunity, company: &CompanyProfile) -> FilterResult {
        self.filter.evaluate(opportunity, company)
    }

    /// Score a single pair end to end, as of today
    ///
    /// Pairs rejected by the quick filter never reach the aligner or the
    /// semantic scorer.
    pub async fn score_pair(&self, opportunity: &Opportunity, company: &CompanyProfile) -> Match {
        self.score_pair_at(opportunity, company, Utc::now()).await
    }

    /// Score a single pair with date-dependent signals measured from `now`
    ///
    /// With a warm embedding cache, repeated calls with the same `now` give
    /// bit-identical scores.
    pub async fn score_pair_at(
        &self,
        opportunity: &Opportunity,
        company: &CompanyProfile,
        now: DateTime<Utc>,
    ) -> Match {
        let pair = PairKey::new(opportunity, company);
        let filter = self.filter.evaluate(opportunity, company);

        if !filter.is_potential_match {
            tracing::debug!(
                "Pair {} / {} rejected by quick filter ({:?})",
                pair.opportunity_id,
                pair.company_id,
                filter.rejected_by
            );
            return self.aggregator.rejected(&pair, &filter, &company.tenant_id);
        }

        let alignment = self.aligner.score(opportunity, company);
        let similarity = self.semantic.score(opportunity, company).await;

        let mut components: BTreeMap<String, ComponentScore> = BTreeMap::new();
        components.insert(QUICK_FILTER.to_string(), Aggregator::filter_component(&filter));
        components.insert(
            NAICS_ALIGNMENT.to_string(),
            ComponentScore::from_outcome(&alignment.outcome(), alignment.processing_time_ms).with_details(json!({
                "match_level": alignment.match_level,
                "opportunity_naics": alignment.opportunity_naics,
                "best_company_code": alignment.best_company_code,
            })),
        );
        components.insert(
            SEMANTIC_SIMILARITY.to_string(),
            ComponentScore::from_outcome(&similarity.outcome(), similarity.processing_time_ms).with_details(json!({
                "full_document_similarity": similarity.full_document_similarity,
                "best_chunk_similarity": similarity.best_chunk_similarity.max_similarity,
                "confidence_indicators": similarity.confidence_indicators,
            })),
        );
        for (name, score) in self.signals.score_at(opportunity, company, now) {
            components.insert(name.to_string(), score);
        }

        self.aggregator
            .combine(&pair, &filter, components, &company.tenant_id)
            .await
    }

    /// Score every opportunity × company pair concurrently
    ///
    /// At most `max_concurrency` pairs are in flight. Once `options.cancel`
    /// fires no new pairs are issued; pairs already running are collected.
    /// A pair whose scoring panics is reported as a failed [`PairResult`].
    /// Every pair is scored as of the moment the batch starts.
    pub async fn match_batch(
        &self,
        opportunities: Vec<Opportunity>,
        companies: Vec<CompanyProfile>,
        options: &BatchOptions,
    ) -> BatchOutcome {
        let total_pairs = opportunities.len() * companies.len();
        tracing::info!(
            "Starting batch: {} opportunities x {} companies (concurrency {})",
            opportunities.len(),
            companies.len(),
            options.max_concurrency
        );

        let opportunities: Vec<Arc<Opportunity>> = opportunities.into_iter().map(Arc::new).collect();
        let companies: Vec<Arc<CompanyProfile>> = companies.into_iter().map(Arc::new).collect();
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        let now = Utc::now();

        let mut tasks = JoinSet::new();
        let mut pending: BTreeMap<PairKey, usize> = BTreeMap::new();
        let mut issued = 0usize;

        'issue: for company in &companies {
            for opportunity in &opportunities {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break 'issue;
                };
                if options.cancel.is_cancelled() {
                    break 'issue;
                }

                let pair = PairKey::new(opportunity, company);
                *pending.entry(pair.clone()).or_default() += 1;
                let pipeline = self.clone();
                let opportunity = Arc::clone(opportunity);
                let company = Arc::clone(company);
                tasks.spawn(async move {
                    let _permit = permit;
                    let scored = AssertUnwindSafe(pipeline.score_pair_at(&opportunity, &company, now))
                        .catch_unwind()
                        .await
                        .map_err(|panic| {
                            panic
                                .downcast_ref::<&str>()
                                .map(|s| s.to_string())
                                .or_else(|| panic.downcast_ref::<String>().cloned())
                                .unwrap_or_else(|| "unknown panic".to_string())
                        });
                    (pair, scored)
                });
                issued += 1;
            }
        }

        let (mut results, failed) = collect_pairs(tasks, pending).await;

        results.sort_by(|a, b| {
            a.opportunity_id
                .cmp(&b.opportunity_id)
                .then_with(|| a.company_id.cmp(&b.company_id))
        });

        let skipped = total_pairs - issued;
        let cancelled = options.cancel.is_cancelled() && skipped > 0;
        if cancelled {
            tracing::warn!("Batch cancelled: {} of {} pairs skipped", skipped, total_pairs);
        }
        tracing::info!(
            "Batch finished: {} completed, {} failed, {} skipped",
            issued - failed,
            failed,
            skipped
        );

        BatchOutcome {
            results,
            total_pairs,
            completed: issued - failed,
            failed,
            skipped,
            cancelled,
        }
    }

    /// Rank opportunities for one company
    ///
    /// Only potential matches are ranked: sorted by `total_score`
    /// descending, then `opportunity_id`, and truncated to `limit`.
    pub async fn rank_for_company(
        &self,
        company: &CompanyProfile,
        opportunities: Vec<Opportunity>,
        limit: usize,
        options: &BatchOptions,
    ) -> RankedMatches {
        let total_candidates = opportunities.len();
        let outcome = self
            .match_batch(opportunities, vec![company.clone()], options)
            .await;

        let mut matches: Vec<Match> = outcome
            .results
            .into_iter()
            .filter_map(|r| r.result)
            .filter(|m| m.is_potential_match)
            .collect();
        let potential_matches = matches.len();

        // Sort by score (descending) and then by opportunity id (ascending)
        matches.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.opportunity_id.cmp(&b.opportunity_id))
        });
        matches.truncate(limit);

        RankedMatches {
            company_id: company.company_id.clone(),
            matches,
            total_candidates,
            potential_matches,
            skipped: outcome.skipped,
            failed: outcome.failed,
        }
    }
}

type PairTask = (PairKey, Result<Match, String>);

/// Drain a batch's tasks into per-pair results
///
/// `pending` counts the issued tasks per pair. A task that cannot be joined
/// carries no pair, so whatever is still pending afterwards is reported as
/// failed under its own ids. Returns the results and the failure count.
async fn collect_pairs(
    mut tasks: JoinSet<PairTask>,
    mut pending: BTreeMap<PairKey, usize>,
) -> (Vec<PairResult>, usize) {
    let mut results = Vec::with_capacity(tasks.len());
    let mut failed = 0usize;

    while let Some(joined) = tasks.join_next().await {
        let (pair, scored) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::error!("Scoring task did not complete: {}", e);
                continue;
            }
        };

        if let Some(count) = pending.get_mut(&pair) {
            *count -= 1;
            if *count == 0 {
                pending.remove(&pair);
            }
        }

        match scored {
            Ok(result) => results.push(PairResult::scored(pair, result)),
            Err(message) => {
                failed += 1;
                tracing::error!(
                    "Scoring {} / {} panicked: {}",
                    pair.opportunity_id,
                    pair.company_id,
                    message
                );
                results.push(PairResult::failed(pair, format!("scoring panicked: {message}")));
            }
        }
    }

    for (pair, count) in pending {
        for _ in 0..count {
            results.push(PairResult::failed(pair.clone(), "scoring task did not complete".to_string()));
        }
        failed += count;
    }

    (results, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::ComponentStatus;
    use crate::core::scoring::ConfidenceThresholds;
    use crate::models::ConfidenceLevel;
    use crate::services::{EmbeddingStore, HashingEmbedder, InMemoryObjectStore, LocalCache, StaticWeights};
    use std::time::Duration;

    fn pipeline() -> MatchPipeline {
        let store = Arc::new(EmbeddingStore::new(
            Arc::new(LocalCache::new(1000, Duration::from_secs(3600))),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(HashingEmbedder::new(256)),
            8000,
            Duration::from_secs(5),
        ));
        MatchPipeline::new(
            QuickFilter::new(),
            Arc::new(SemanticScorer::new(store, 20)),
            Arc::new(Aggregator::new(
                Arc::new(StaticWeights::default()),
                ConfidenceThresholds::default(),
            )),
        )
    }

    fn company() -> CompanyProfile {
        let mut company = CompanyProfile::new("C1", "Cloudline Federal");
        company.naics_codes = vec!["541512".to_string(), "541511".to_string()];
        company.capability_statement = "Cloud migration, cybersecurity monitoring and software \
            development for federal agencies. Agile teams modernize legacy systems."
            .to_string();
        company.certifications = vec!["8(a)".to_string(), "Small Business".to_string()];
        company
    }

    fn opportunity(id: &str, naics: &str) -> Opportunity {
        let mut opp = Opportunity::new(
            id,
            "Cloud migration and cybersecurity support",
            "Provide cloud migration, cybersecurity monitoring and software development to modernize legacy agency systems.",
        );
        opp.naics_code = Some(naics.to_string());
        opp.agency = Some("Department of Homeland Security".to_string());
        opp
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_score_pair_populates_every_component() {
        let m = pipeline().score_pair(&opportunity("N1", "541512"), &company()).await;
        assert!(m.is_potential_match);
        for name in [
            QUICK_FILTER,
            NAICS_ALIGNMENT,
            SEMANTIC_SIMILARITY,
            "certification_bonus",
            "geographic_match",
            "capacity_fit",
            "recency_factor",
            "past_performance",
        ] {
            assert!(m.component_scores.contains_key(name), "missing {name}");
        }
        assert_eq!(m.component_scores[NAICS_ALIGNMENT].score, 1.0);
        assert!((0.0..=1.0).contains(&m.total_score));
    }

    #[tokio::test]
    async fn test_rejected_pair_skips_scorers() {
        let mut opp = opportunity("N1", "541512");
        opp.description.push_str(" Work involves nuclear facilities.");
        let m = pipeline().score_pair(&opp, &company()).await;
        assert!(!m.is_potential_match);
        assert_eq!(m.total_score, 0.0);
        assert_eq!(m.confidence_level, ConfidenceLevel::Low);
        assert!(!m.component_scores.contains_key(SEMANTIC_SIMILARITY));
    }

    #[tokio::test]
    async fn test_rank_for_company_orders_and_limits() {
        let opportunities = vec![
            opportunity("N3", "541330"),
            opportunity("N1", "541512"),
            opportunity("N2", "541512"),
        ];
        let ranked = pipeline()
            .rank_for_company(&company(), opportunities, 2, &BatchOptions::new(2))
            .await;

        assert_eq!(ranked.total_candidates, 3);
        assert_eq!(ranked.matches.len(), 2);
        // N1 and N2 are identical apart from their id
        assert_eq!(ranked.matches[0].opportunity_id, "N1");
        assert_eq!(ranked.matches[1].opportunity_id, "N2");
        assert!(ranked.matches[0].total_score >= ranked.matches[1].total_score);
    }

    #[tokio::test]
    async fn test_batch_attributes_every_pair() {
        let mut other = company();
        other.company_id = "C2".to_string();
        let outcome = pipeline()
            .match_batch(
                vec![opportunity("N1", "541512"), opportunity("N2", "541511")],
                vec![company(), other],
                &BatchOptions::new(3),
            )
            .await;

        assert_eq!(outcome.total_pairs, 4);
        assert_eq!(outcome.completed, 4);
        assert_eq!(outcome.skipped, 0);
        let pairs: Vec<(&str, &str)> = outcome
            .results
            .iter()
            .map(|r| (r.opportunity_id.as_str(), r.company_id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("N1", "C1"), ("N1", "C2"), ("N2", "C1"), ("N2", "C2")]);
        for r in &outcome.results {
            let m = r.result.as_ref().unwrap();
            assert_eq!(m.opportunity_id, r.opportunity_id);
            assert_eq!(m.company_id, r.company_id);
        }
    }

    #[tokio::test]
    async fn test_cancelled_batch_issues_nothing() {
        let options = BatchOptions::new(2);
        options.cancel.cancel();
        let outcome = pipeline()
            .match_batch(vec![opportunity("N1", "541512")], vec![company()], &options)
            .await;
        assert!(outcome.cancelled);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn test_scoring_with_dates_is_repeatable() {
        use chrono::TimeZone;

        let morning = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        let mut opp = opportunity("N1", "541512");
        opp.posted_date = Some(morning - chrono::Duration::days(20));
        opp.response_deadline = Some(morning + chrono::Duration::days(5));
        let pipeline = pipeline();

        let first = pipeline.score_pair_at(&opp, &company(), morning).await;
        let later = pipeline
            .score_pair_at(&opp, &company(), morning + chrono::Duration::hours(1))
            .await;

        assert_eq!(first.component_scores["recency_factor"].status, ComponentStatus::Ok);
        assert_eq!(first.total_score.to_bits(), later.total_score.to_bits());
        assert_eq!(
            first.component_scores["recency_factor"].score.to_bits(),
            later.component_scores["recency_factor"].score.to_bits()
        );
    }

    #[tokio::test]
    async fn test_unjoined_task_is_reported_under_its_pair() {
        let panicked = PairKey {
            opportunity_id: "N1".to_string(),
            company_id: "C1".to_string(),
        };
        let aborted = PairKey {
            opportunity_id: "N2".to_string(),
            company_id: "C1".to_string(),
        };
        let pending = BTreeMap::from([(panicked.clone(), 1), (aborted.clone(), 1)]);

        let mut tasks: JoinSet<PairTask> = JoinSet::new();
        let pair = panicked.clone();
        tasks.spawn(async move { (pair, Err("boom".to_string())) });
        let pair = aborted.clone();
        let handle = tasks.spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            (pair, Err("never finishes".to_string()))
        });
        handle.abort();

        let (mut results, failed) = collect_pairs(tasks, pending).await;
        results.sort_by(|a, b| a.opportunity_id.cmp(&b.opportunity_id));

        assert_eq!(failed, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].error.as_deref(), Some("scoring panicked: boom"));
        assert_eq!(results[1].opportunity_id, "N2");
        assert_eq!(results[1].company_id, "C1");
        assert_eq!(results[1].error.as_deref(), Some("scoring task did not complete"));
        assert!(results[1].result.is_none());
    }
}
