//! Supplementary match signals
//!
//! Each signal is a cheap, pure function of the pair (and the scoring date,
//! for recency) producing a [`ComponentOutcome`]. Missing inputs give a
//! neutral `no_data` score rather than a penalty.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Instant;

use crate::core::outcome::{elapsed_ms, guarded, ComponentOutcome, ComponentScore};
use crate::core::text::tokenize;
use crate::data::set_asides::{identify_program, is_recognised_certification, satisfying_certification};
use crate::models::{CompanyProfile, Opportunity};

/// Neutral score for signals without data
const NEUTRAL: f64 = 0.5;

/// Contract dollars one employee is assumed to deliver
const CAPACITY_PER_EMPLOYEE: f64 = 250_000.0;
const MIN_CAPACITY_SCORE: f64 = 0.2;

const FRESH_DAYS: f64 = 7.0;
const STALE_DAYS: f64 = 90.0;
const STALE_SCORE: f64 = 0.3;
/// Days before the deadline below which preparation time is tight
const COMFORTABLE_LEAD_DAYS: f64 = 14.0;

const PAST_PERFORMANCE_CAP: usize = 10;

pub const CERTIFICATION_BONUS: &str = "certification_bonus";
pub const GEOGRAPHIC_MATCH: &str = "geographic_match";
pub const CAPACITY_FIT: &str = "capacity_fit";
pub const RECENCY_FACTOR: &str = "recency_factor";
pub const PAST_PERFORMANCE: &str = "past_performance";

/// A scored signal plus a short human-readable explanation
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub outcome: ComponentOutcome,
    pub details: String,
}

impl Signal {
    fn ok(score: f64, details: impl Into<String>) -> Self {
        Self {
            outcome: ComponentOutcome::ok(score),
            details: details.into(),
        }
    }

    fn no_data(details: impl Into<String>) -> Self {
        Self {
            outcome: ComponentOutcome::no_data(NEUTRAL),
            details: details.into(),
        }
    }

    pub fn score(&self) -> f64 {
        self.outcome.score()
    }
}

/// Set-aside fit and breadth of recognised certifications
pub fn certification_bonus(opportunity: &Opportunity, company: &CompanyProfile) -> Signal {
    if let Some(program) = opportunity.set_aside.as_deref().and_then(identify_program) {
        if let Some(cert) = satisfying_certification(program, &company.certifications) {
            return Signal::ok(1.0, format!("{} set-aside satisfied by '{}'", program.as_str(), cert));
        }
    }

    if company.certifications.is_empty() {
        return Signal::ok(0.3, "no certifications");
    }

    let recognised = company
        .certifications
        .iter()
        .filter(|c| is_recognised_certification(c))
        .count();
    Signal::ok(
        0.5 + 0.1 * recognised as f64,
        format!("{recognised} recognised certifications"),
    )
}

fn same(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.trim().eq_ignore_ascii_case(b.trim()))
}

/// Company presence in the place of performance
pub fn geographic_match(opportunity: &Opportunity, company: &CompanyProfile) -> Signal {
    let place = &opportunity.location;
    if place.is_unconstrained() {
        return Signal::ok(0.8, "no location constraint");
    }
    if company.locations.is_empty() {
        return Signal::no_data("company locations unknown");
    }

    let state = place.state.as_deref();
    let city = place.city.as_deref();
    let city_and_state = company
        .locations
        .iter()
        .any(|loc| same(loc.state.as_deref(), state) && same(loc.city.as_deref(), city));
    if city_and_state {
        return Signal::ok(1.0, "office in the city of performance");
    }
    if company.locations.iter().any(|loc| same(loc.state.as_deref(), state)) {
        return Signal::ok(0.9, "office in the state of performance");
    }
    if opportunity.is_federal() {
        return Signal::ok(0.8, "federal opportunity, location flexible");
    }
    Signal::ok(0.4, "no presence near the place of performance")
}

/// Contract value against workforce capacity
pub fn capacity_fit(opportunity: &Opportunity, company: &CompanyProfile) -> Signal {
    let (Some(value), Some(headcount)) = (opportunity.estimated_value, company.employee_count) else {
        return Signal::no_data("contract value or headcount unknown");
    };
    if headcount == 0 {
        return Signal::no_data("headcount unknown");
    }

    let capacity = headcount as f64 * CAPACITY_PER_EMPLOYEE;
    let ratio = value / capacity;
    if ratio <= 1.0 {
        Signal::ok(1.0, format!("${value:.0} within ${capacity:.0} capacity"))
    } else {
        Signal::ok(
            (1.0 / ratio).max(MIN_CAPACITY_SCORE),
            format!("${value:.0} is {ratio:.1}x estimated capacity"),
        )
    }
}

/// Freshness of the posting and time left to respond, as of `now`
///
/// Counts whole calendar days (UTC), so the score is stable for every call
/// made on the same day. A deadline later today is still open.
pub fn recency_factor(opportunity: &Opportunity, now: DateTime<Utc>) -> Signal {
    let today = now.date_naive();

    let posted = opportunity.posted_date.map(|posted| {
        let days = (today - posted.date_naive()).num_days().max(0) as f64;
        if days <= FRESH_DAYS {
            1.0
        } else if days >= STALE_DAYS {
            STALE_SCORE
        } else {
            1.0 - (1.0 - STALE_SCORE) * (days - FRESH_DAYS) / (STALE_DAYS - FRESH_DAYS)
        }
    });

    let remaining = match opportunity.response_deadline.map(|d| (d.date_naive() - today).num_days()) {
        Some(days) if days < 0 => return Signal::ok(0.0, "response deadline has passed"),
        Some(days) => {
            let days = days as f64;
            Some(if days >= COMFORTABLE_LEAD_DAYS {
                1.0
            } else {
                STALE_SCORE + (1.0 - STALE_SCORE) * days / COMFORTABLE_LEAD_DAYS
            })
        }
        None => None,
    };

    match (posted, remaining) {
        (Some(p), Some(r)) => Signal::ok((p + r) / 2.0, format!("posting {p:.2}, lead time {r:.2}")),
        (Some(p), None) => Signal::ok(p, format!("posting {p:.2}")),
        (None, Some(r)) => Signal::ok(r, format!("lead time {r:.2}")),
        (None, None) => Signal::no_data("no posting or deadline dates"),
    }
}

/// Vocabulary shared with the company's past-performance document
pub fn past_performance(opportunity: &Opportunity, company: &CompanyProfile) -> Signal {
    let Some(document) = company.document("past_performance") else {
        return Signal::no_data("no past performance on file");
    };

    let opp_tokens = tokenize(&format!("{} {}", opportunity.title, opportunity.description));
    let doc_tokens = tokenize(document);
    let overlap = opp_tokens.intersection(&doc_tokens).count();
    Signal::ok(
        overlap.min(PAST_PERFORMANCE_CAP) as f64 / PAST_PERFORMANCE_CAP as f64,
        format!("{overlap} terms shared with past performance"),
    )
}

/// Runs every supplementary signal behind the panic boundary
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalScorer;

impl SignalScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score every signal with recency measured from `now`
    pub fn score_at(
        &self,
        opportunity: &Opportunity,
        company: &CompanyProfile,
        now: DateTime<Utc>,
    ) -> Vec<(&'static str, ComponentScore)> {
        let run = |name: &'static str, f: &dyn Fn() -> Signal| {
            let start = Instant::now();
            let (outcome, details) = match guarded(name, f) {
                Ok(signal) => (signal.outcome, Some(signal.details)),
                Err(err) => (ComponentOutcome::failed(&err), None),
            };
            let mut score = ComponentScore::from_outcome(&outcome, elapsed_ms(start));
            if let Some(details) = details {
                score = score.with_details(json!(details));
            }
            (name, score)
        };

        vec![
            run(CERTIFICATION_BONUS, &|| certification_bonus(opportunity, company)),
            run(GEOGRAPHIC_MATCH, &|| geographic_match(opportunity, company)),
            run(CAPACITY_FIT, &|| capacity_fit(opportunity, company)),
            run(RECENCY_FACTOR, &|| recency_factor(opportunity, now)),
            run(PAST_PERFORMANCE, &|| past_performance(opportunity, company)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::ComponentStatus;
    use crate::models::Location;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_certification_bonus() {
        let mut opp = Opportunity::new("N1", "t", "d");
        opp.set_aside = Some("8(a) Set-Aside".to_string());
        let mut company = CompanyProfile::new("C1", "Acme");
        assert_eq!(certification_bonus(&opp, &company).score(), 0.3);

        company.certifications = vec!["ISO 9001".to_string(), "WOSB".to_string()];
        assert!((certification_bonus(&opp, &company).score() - 0.6).abs() < 1e-9);

        company.certifications.push("8(a)".to_string());
        assert_eq!(certification_bonus(&opp, &company).score(), 1.0);
    }

    #[test]
    fn test_geographic_match_tiers() {
        let mut opp = Opportunity::new("N1", "t", "d");
        let mut company = CompanyProfile::new("C1", "Acme");
        assert_eq!(geographic_match(&opp, &company).score(), 0.8);

        opp.location = Location::new(Some("VA"), Some("Arlington"));
        let signal = geographic_match(&opp, &company);
        assert_eq!(signal.outcome.status(), ComponentStatus::NoData);

        company.locations = vec![Location::new(Some("va"), Some("arlington"))];
        assert_eq!(geographic_match(&opp, &company).score(), 1.0);

        company.locations = vec![Location::new(Some("VA"), Some("Richmond"))];
        assert_eq!(geographic_match(&opp, &company).score(), 0.9);

        company.locations = vec![Location::new(Some("TX"), None)];
        assert_eq!(geographic_match(&opp, &company).score(), 0.4);

        opp.agency = Some("Department of Defense".to_string());
        assert_eq!(geographic_match(&opp, &company).score(), 0.8);
    }

    #[test]
    fn test_capacity_fit() {
        let mut opp = Opportunity::new("N1", "t", "d");
        let mut company = CompanyProfile::new("C1", "Acme");
        assert_eq!(capacity_fit(&opp, &company).outcome.status(), ComponentStatus::NoData);

        opp.estimated_value = Some(1_000_000.0);
        company.employee_count = Some(4);
        assert_eq!(capacity_fit(&opp, &company).score(), 1.0);

        opp.estimated_value = Some(2_000_000.0);
        assert_eq!(capacity_fit(&opp, &company).score(), 0.5);

        opp.estimated_value = Some(100_000_000.0);
        assert_eq!(capacity_fit(&opp, &company).score(), MIN_CAPACITY_SCORE);
    }

    #[test]
    fn test_recency_factor() {
        let now = Utc::now();
        let mut opp = Opportunity::new("N1", "t", "d");
        assert_eq!(recency_factor(&opp, now).outcome.status(), ComponentStatus::NoData);

        opp.posted_date = Some(now - Duration::days(2));
        assert_eq!(recency_factor(&opp, now).score(), 1.0);

        opp.posted_date = Some(now - Duration::days(120));
        assert_eq!(recency_factor(&opp, now).score(), STALE_SCORE);

        opp.posted_date = Some(now - Duration::days(2));
        opp.response_deadline = Some(now + Duration::days(30));
        assert_eq!(recency_factor(&opp, now).score(), 1.0);

        opp.response_deadline = Some(now - Duration::days(1));
        let expired = recency_factor(&opp, now);
        assert_eq!(expired.score(), 0.0);
        assert_eq!(expired.outcome.status(), ComponentStatus::Ok);
    }

    #[test]
    fn test_recency_stable_within_a_day() {
        let morning = Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        let mut opp = Opportunity::new("N1", "t", "d");
        opp.posted_date = Some(morning - Duration::days(20));
        opp.response_deadline = Some(morning + Duration::days(5));

        let early = recency_factor(&opp, morning).score();
        for hours in [1, 6, 15] {
            let later = recency_factor(&opp, morning + Duration::hours(hours)).score();
            assert_eq!(early.to_bits(), later.to_bits(), "changed after {hours}h");
        }
        assert_ne!(recency_factor(&opp, morning + Duration::days(1)).score(), early);

        // Due later today is still open
        opp.response_deadline = Some(morning + Duration::hours(4));
        assert!(recency_factor(&opp, morning + Duration::hours(2)).score() > 0.0);
    }

    #[test]
    fn test_past_performance() {
        let opp = Opportunity::new("N1", "Network modernization", "Upgrade routers switches firewalls");
        let mut company = CompanyProfile::new("C1", "Acme");
        assert_eq!(past_performance(&opp, &company).outcome.status(), ComponentStatus::NoData);

        company.documents.insert(
            "past_performance".to_string(),
            "Delivered network modernization: replaced routers and firewalls".to_string(),
        );
        // network, modernization, routers, firewalls
        assert!((past_performance(&opp, &company).score() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_signal_scorer_reports_every_component() {
        let opp = Opportunity::new("N1", "t", "d");
        let company = CompanyProfile::new("C1", "Acme");
        let scores = SignalScorer::new().score_at(&opp, &company, Utc::now());
        let names: Vec<&str> = scores.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![CERTIFICATION_BONUS, GEOGRAPHIC_MATCH, CAPACITY_FIT, RECENCY_FACTOR, PAST_PERFORMANCE]
        );
        assert!(scores.iter().all(|(_, s)| (0.0..=1.0).contains(&s.score)));
    }
}
