use chrono::Utc;
use futures_util::future::join_all;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::filters::FilterResult;
use crate::core::outcome::{clamp_unit, ComponentOutcome, ComponentScore, ComponentStatus};
use crate::models::{ConfidenceLevel, Match, PairKey};
use crate::services::weights::{resolve_weight, WeightSource};

/// Name under which the quick filter appears in `component_scores`
pub const QUICK_FILTER: &str = "quick_filter";

/// Component scores at or above this are cited as match reasons
const STRONG_COMPONENT_SCORE: f64 = 0.7;

/// Score cutoffs for HIGH and MEDIUM confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
}

impl ConfidenceThresholds {
    pub fn new(high: f64, medium: f64) -> Self {
        Self { high, medium }
    }

    pub fn level(&self, score: f64) -> ConfidenceLevel {
        if score >= self.high {
            ConfidenceLevel::High
        } else if score >= self.medium {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self::new(0.7, 0.4)
    }
}

/// Combines the quick-filter decision and named component scores into a
/// weighted [`Match`]
///
/// ```text
/// total_score = Σ(score_i · weight_i) / Σ(weight_i present)
/// ```
///
/// Only components actually supplied take part in the renormalisation.
/// A component in `error` stays in the denominator with a score of 0 and
/// lowers confidence by one level.
pub struct Aggregator {
    weights: Arc<dyn WeightSource>,
    thresholds: ConfidenceThresholds,
}

impl Aggregator {
    pub fn new(weights: Arc<dyn WeightSource>, thresholds: ConfidenceThresholds) -> Self {
        Self { weights, thresholds }
    }

    /// Build the quick filter's own component entry
    pub fn filter_component(filter: &FilterResult) -> ComponentScore {
        let passed = filter.checks.values().filter(|c| c.passed).count();
        ComponentScore::from_outcome(&ComponentOutcome::ok(filter.filter_score), 0.0).with_details(json!({
            "checks_run": filter.checks.len(),
            "checks_passed": passed,
            "rejected_by": filter.rejected_by,
        }))
    }

    /// Combine component scores for a pair the quick filter let through.
    /// A rejected filter result short-circuits to [`Aggregator::rejected`].
    pub async fn combine(
        &self,
        pair: &PairKey,
        filter: &FilterResult,
        mut components: BTreeMap<String, ComponentScore>,
        tenant_id: &str,
    ) -> Match {
        if !filter.is_potential_match {
            return self.rejected(pair, filter, tenant_id);
        }

        components
            .entry(QUICK_FILTER.to_string())
            .or_insert_with(|| Self::filter_component(filter));

        let names: Vec<String> = components.keys().cloned().collect();
        let raw_weights = join_all(
            names
                .iter()
                .map(|name| resolve_weight(self.weights.as_ref(), name, tenant_id)),
        )
        .await;

        let weight_sum: f64 = raw_weights.iter().sum();
        let mut weighted_sum = 0.0;
        for (name, raw) in names.iter().zip(&raw_weights) {
            if let Some(component) = components.get_mut(name) {
                component.weight = if weight_sum > 0.0 { raw / weight_sum } else { 0.0 };
                weighted_sum += clamp_unit(component.score) * component.weight;
            }
        }
        let total_score = clamp_unit(weighted_sum);

        let degraded_components: Vec<String> = components
            .iter()
            .filter(|(_, c)| c.status != ComponentStatus::Ok)
            .map(|(name, _)| name.clone())
            .collect();

        let mut confidence_level = self.thresholds.level(total_score);
        if components.values().any(|c| c.status == ComponentStatus::Error) {
            confidence_level = confidence_level.lowered();
        }

        let mut match_reasons: Vec<String> = components
            .iter()
            .filter(|(name, c)| {
                name.as_str() != QUICK_FILTER
                    && c.status == ComponentStatus::Ok
                    && c.score >= STRONG_COMPONENT_SCORE
            })
            .map(|(name, c)| format!("strong {} ({:.2})", name, c.score))
            .collect();
        match_reasons.extend(filter.pass_reasons.iter().cloned());
        for name in &degraded_components {
            if let Some(c) = components.get(name) {
                match_reasons.push(format!("{} degraded ({})", name, c.status.as_str()));
            }
        }

        tracing::debug!(
            "Combined {} / {}: total {:.4} ({:?}), degraded {:?}",
            pair.opportunity_id,
            pair.company_id,
            total_score,
            confidence_level,
            degraded_components
        );

        Match {
            opportunity_id: pair.opportunity_id.clone(),
            company_id: pair.company_id.clone(),
            tenant_id: tenant_id.to_string(),
            is_potential_match: true,
            component_scores: components,
            total_score,
            confidence_level,
            match_reasons,
            degraded_components,
            created_at: Utc::now(),
        }
    }

    /// Zero-score LOW match for a pair the quick filter rejected
    pub fn rejected(&self, pair: &PairKey, filter: &FilterResult, tenant_id: &str) -> Match {
        Match {
            opportunity_id: pair.opportunity_id.clone(),
            company_id: pair.company_id.clone(),
            tenant_id: tenant_id.to_string(),
            is_potential_match: false,
            component_scores: BTreeMap::from([(QUICK_FILTER.to_string(), Self::filter_component(filter))]),
            total_score: 0.0,
            confidence_level: ConfidenceLevel::Low,
            match_reasons: filter.fail_reasons.clone(),
            degraded_components: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::ScoringError;
    use crate::services::weights::StaticWeights;

    fn passing_filter(score: f64) -> FilterResult {
        FilterResult {
            is_potential_match: true,
            filter_score: score,
            checks: BTreeMap::new(),
            pass_reasons: vec!["active_status: company is active".to_string()],
            fail_reasons: Vec::new(),
            rejected_by: None,
        }
    }

    fn component(outcome: ComponentOutcome) -> ComponentScore {
        ComponentScore::from_outcome(&outcome, 0.0)
    }

    fn pair() -> PairKey {
        PairKey {
            opportunity_id: "N1".to_string(),
            company_id: "C1".to_string(),
        }
    }

    fn aggregator(weights: StaticWeights) -> Aggregator {
        Aggregator::new(Arc::new(weights), ConfidenceThresholds::default())
    }

    #[test]
    fn test_confidence_thresholds() {
        let t = ConfidenceThresholds::default();
        assert_eq!(t.level(0.7), ConfidenceLevel::High);
        assert_eq!(t.level(0.69), ConfidenceLevel::Medium);
        assert_eq!(t.level(0.4), ConfidenceLevel::Medium);
        assert_eq!(t.level(0.39), ConfidenceLevel::Low);
    }

    #[tokio::test]
    async fn test_renormalizes_over_present_components() {
        let agg = aggregator(StaticWeights::default());
        let components = BTreeMap::from([
            ("naics_alignment".to_string(), component(ComponentOutcome::ok(1.0))),
            ("semantic_similarity".to_string(), component(ComponentOutcome::ok(0.6))),
        ]);

        let m = agg.combine(&pair(), &passing_filter(0.8), components, "default").await;

        // quick_filter .10, naics .15, semantic .25 → sum .50
        let expected = (0.8 * 0.10 + 1.0 * 0.15 + 0.6 * 0.25) / 0.50;
        assert!((m.total_score - expected).abs() < 1e-9);
        let weight_sum: f64 = m.component_scores.values().map(|c| c.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
        assert!(m.is_potential_match);
        assert!(m.degraded_components.is_empty());
    }

    #[tokio::test]
    async fn test_failed_component_contributes_zero_and_lowers_confidence() {
        let agg = aggregator(StaticWeights::default());
        let failed = ComponentOutcome::failed(&ScoringError::Internal("boom".into()));
        let components = BTreeMap::from([
            ("naics_alignment".to_string(), component(ComponentOutcome::ok(1.0))),
            ("semantic_similarity".to_string(), component(failed)),
        ]);

        let m = agg.combine(&pair(), &passing_filter(1.0), components, "default").await;

        let expected = (1.0 * 0.10 + 1.0 * 0.15) / 0.50;
        assert!((m.total_score - expected).abs() < 1e-9);
        assert_eq!(m.degraded_components, vec!["semantic_similarity".to_string()]);
        // 0.5 is MEDIUM, lowered to LOW
        assert_eq!(m.confidence_level, ConfidenceLevel::Low);
        assert_eq!(m.component_scores["semantic_similarity"].status, ComponentStatus::Error);
    }

    #[tokio::test]
    async fn test_degraded_components_are_flagged_but_count() {
        let agg = aggregator(StaticWeights::default());
        let components = BTreeMap::from([
            ("naics_alignment".to_string(), component(ComponentOutcome::fallback(0.6))),
        ]);

        let m = agg.combine(&pair(), &passing_filter(0.6), components, "default").await;

        let expected = (0.6 * 0.10 + 0.6 * 0.15) / 0.25;
        assert!((m.total_score - expected).abs() < 1e-9);
        assert_eq!(m.degraded_components, vec!["naics_alignment".to_string()]);
        assert_eq!(m.confidence_level, ConfidenceLevel::Medium);
    }

    #[tokio::test]
    async fn test_tenant_weights_change_the_blend() {
        let weights = StaticWeights::default()
            .with_tenant_weight("heavy-naics", "naics_alignment", 0.9)
            .with_tenant_weight("heavy-naics", "quick_filter", 0.1);
        let agg = aggregator(weights);
        let components = || {
            BTreeMap::from([("naics_alignment".to_string(), component(ComponentOutcome::ok(1.0)))])
        };

        let default = agg.combine(&pair(), &passing_filter(0.0), components(), "default").await;
        let tenant = agg.combine(&pair(), &passing_filter(0.0), components(), "heavy-naics").await;

        assert!((default.total_score - 0.6).abs() < 1e-9);
        assert!((tenant.total_score - 0.9).abs() < 1e-9);
        assert_eq!(tenant.tenant_id, "heavy-naics");
    }

    #[tokio::test]
    async fn test_rejected_filter_short_circuits() {
        let agg = aggregator(StaticWeights::default());
        let filter = FilterResult {
            is_potential_match: false,
            filter_score: 0.3,
            checks: BTreeMap::new(),
            pass_reasons: Vec::new(),
            fail_reasons: vec!["exclusion_check: opportunity mentions excluded term 'nuclear'".to_string()],
            rejected_by: Some("exclusion_check".to_string()),
        };
        let components = BTreeMap::from([
            ("naics_alignment".to_string(), component(ComponentOutcome::ok(1.0))),
        ]);

        let m = agg.combine(&pair(), &filter, components, "default").await;

        assert!(!m.is_potential_match);
        assert_eq!(m.total_score, 0.0);
        assert_eq!(m.confidence_level, ConfidenceLevel::Low);
        assert_eq!(m.component_scores.len(), 1);
        assert!(m.match_reasons[0].contains("nuclear"));
    }

    #[tokio::test]
    async fn test_scores_stay_in_unit_interval() {
        let agg = aggregator(StaticWeights::default());
        let mut wild = component(ComponentOutcome::ok(1.0));
        wild.score = 3.5;
        let components = BTreeMap::from([("capacity_fit".to_string(), wild)]);
        let m = agg.combine(&pair(), &passing_filter(1.0), components, "default").await;
        assert!(m.total_score <= 1.0 && m.total_score >= 0.0);
    }
}
