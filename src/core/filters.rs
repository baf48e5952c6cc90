use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::industry::IndustrySignals;
use crate::core::outcome::{clamp_unit, guarded, ScoringError};
use crate::core::text::{contains_any, contains_term, tokenize};
use crate::data::keywords::{EXCLUSION_TERMS, IT_CONTEXT_KEYWORDS};
use crate::data::set_asides::{identify_program, satisfying_certification};
use crate::models::{CompanyProfile, Opportunity};

/// Contract value above which very small companies are flagged
const LARGE_CONTRACT_VALUE: f64 = 10_000_000.0;
/// Headcount below which a company is considered very small
const SMALL_COMPANY_HEADCOUNT: u32 = 10;
/// Overlapping tokens required for `keyword_match` to pass
const MIN_KEYWORD_OVERLAP: usize = 3;
/// Overlap count at which `keyword_match` saturates
const KEYWORD_OVERLAP_CAP: usize = 10;

const ACTIVE_STATUSES: &[&str] = &["active", "verified", "approved"];

/// The individual quick-filter checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterCheck {
    ActiveStatus,
    SetAsideEligible,
    ExclusionCheck,
    IndustryCompatible,
    NaicsAlignment,
    KeywordMatch,
    GeographicEligible,
    SizeCompatibility,
    DeadlineFeasible,
}

impl FilterCheck {
    /// Evaluation order: critical checks first so a rejection never waits on
    /// the rest
    pub const ALL: [FilterCheck; 9] = [
        FilterCheck::ActiveStatus,
        FilterCheck::SetAsideEligible,
        FilterCheck::ExclusionCheck,
        FilterCheck::IndustryCompatible,
        FilterCheck::NaicsAlignment,
        FilterCheck::KeywordMatch,
        FilterCheck::GeographicEligible,
        FilterCheck::SizeCompatibility,
        FilterCheck::DeadlineFeasible,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterCheck::ActiveStatus => "active_status",
            FilterCheck::SetAsideEligible => "set_aside_eligible",
            FilterCheck::ExclusionCheck => "exclusion_check",
            FilterCheck::IndustryCompatible => "industry_compatible",
            FilterCheck::NaicsAlignment => "naics_alignment",
            FilterCheck::KeywordMatch => "keyword_match",
            FilterCheck::GeographicEligible => "geographic_eligible",
            FilterCheck::SizeCompatibility => "size_compatibility",
            FilterCheck::DeadlineFeasible => "deadline_feasible",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            FilterCheck::ActiveStatus
            | FilterCheck::SetAsideEligible
            | FilterCheck::ExclusionCheck
            | FilterCheck::IndustryCompatible => 0.18,
            FilterCheck::NaicsAlignment => 0.12,
            FilterCheck::KeywordMatch => 0.08,
            FilterCheck::GeographicEligible => 0.04,
            FilterCheck::SizeCompatibility | FilterCheck::DeadlineFeasible => 0.02,
        }
    }

    /// A failing critical check rejects the pair outright
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            FilterCheck::ActiveStatus
                | FilterCheck::SetAsideEligible
                | FilterCheck::ExclusionCheck
                | FilterCheck::IndustryCompatible
        )
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    pub score: f64,
    pub details: String,
}

impl CheckResult {
    fn pass(score: f64, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            score: clamp_unit(score),
            details: details.into(),
        }
    }

    fn fail(score: f64, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: clamp_unit(score),
            details: details.into(),
        }
    }
}

/// Quick-filter decision for one (opportunity, company) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub is_potential_match: bool,
    pub filter_score: f64,
    pub checks: BTreeMap<String, CheckResult>,
    pub pass_reasons: Vec<String>,
    pub fail_reasons: Vec<String>,
    /// Name of the critical check that rejected the pair, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
}

impl FilterResult {
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.get(name)
    }

    /// Rejection produced when the filter itself failed
    fn failed(err: &ScoringError) -> Self {
        Self {
            is_potential_match: false,
            filter_score: 0.0,
            checks: BTreeMap::new(),
            pass_reasons: Vec::new(),
            fail_reasons: vec![format!("quick_filter: {err}")],
            rejected_by: Some("quick_filter".to_string()),
        }
    }
}

/// Cheap rule-based gate in front of the expensive scorers
///
/// Pure compute over the two inputs and the static tables in
/// [`crate::data`]; safe to share across threads without locking.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuickFilter {
    run_all_checks: bool,
}

impl QuickFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep evaluating after a critical failure so every check is reported.
    /// The decision is unaffected.
    pub fn with_all_checks(mut self, run_all_checks: bool) -> Self {
        self.run_all_checks = run_all_checks;
        self
    }

    /// Evaluate all checks for a pair. An internal panic rejects the pair.
    pub fn evaluate(&self, opportunity: &Opportunity, company: &CompanyProfile) -> FilterResult {
        guarded("quick_filter", || self.run_checks(opportunity, company))
            .unwrap_or_else(|err| FilterResult::failed(&err))
    }

    fn run_checks(&self, opportunity: &Opportunity, company: &CompanyProfile) -> FilterResult {
        let mut checks = BTreeMap::new();
        let mut pass_reasons = Vec::new();
        let mut fail_reasons = Vec::new();
        let mut filter_score = 0.0;
        let mut rejected_by = None;

        for check in FilterCheck::ALL {
            if rejected_by.is_some() && !self.run_all_checks {
                break;
            }

            let result = run_check(check, opportunity, company);
            filter_score += result.score * check.weight();

            let reason = format!("{}: {}", check.name(), result.details);
            if result.passed {
                pass_reasons.push(reason);
            } else {
                fail_reasons.push(reason);
                if check.is_critical() && rejected_by.is_none() {
                    tracing::debug!(
                        "Critical check {} failed for {} / {}",
                        check.name(),
                        opportunity.notice_id,
                        company.company_id
                    );
                    rejected_by = Some(check.name().to_string());
                }
            }
            checks.insert(check.name().to_string(), result);
        }

        let filter_score = clamp_unit(filter_score);
        let is_potential_match = rejected_by.is_none()
            && filter_score >= 0.5
            && pass_reasons.len() >= fail_reasons.len();

        FilterResult {
            is_potential_match,
            filter_score,
            checks,
            pass_reasons,
            fail_reasons,
            rejected_by,
        }
    }
}

fn run_check(check: FilterCheck, opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    match check {
        FilterCheck::ActiveStatus => check_active_status(company),
        FilterCheck::SetAsideEligible => check_set_aside(opportunity, company),
        FilterCheck::ExclusionCheck => check_exclusions(opportunity, company),
        FilterCheck::IndustryCompatible => check_industry(opportunity, company),
        FilterCheck::NaicsAlignment => check_naics(opportunity, company),
        FilterCheck::KeywordMatch => check_keywords(opportunity, company),
        FilterCheck::GeographicEligible => check_geography(opportunity, company),
        FilterCheck::SizeCompatibility => check_size(opportunity, company),
        FilterCheck::DeadlineFeasible => check_deadline(opportunity),
    }
}

fn check_active_status(company: &CompanyProfile) -> CheckResult {
    let status = company.status.trim().to_lowercase();
    if company.active_status && ACTIVE_STATUSES.contains(&status.as_str()) {
        CheckResult::pass(1.0, format!("company is {status}"))
    } else {
        CheckResult::fail(0.0, format!("company inactive (status: {status})"))
    }
}

fn check_set_aside(opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    let set_aside = match opportunity.set_aside.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return CheckResult::pass(1.0, "no set-aside restriction"),
    };

    let Some(program) = identify_program(set_aside) else {
        return CheckResult::pass(1.0, format!("set-aside '{set_aside}' is unrestricted"));
    };

    match satisfying_certification(program, &company.certifications) {
        Some(cert) => CheckResult::pass(1.0, format!("{} set-aside satisfied by '{}'", program.as_str(), cert)),
        None => CheckResult::fail(
            0.0,
            format!("{} set-aside requires a matching certification", program.as_str()),
        ),
    }
}

fn check_exclusions(opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    let text = opportunity.search_text();

    if let Some(term) = EXCLUSION_TERMS.iter().find(|t| contains_term(&text, t)) {
        return CheckResult::fail(0.0, format!("opportunity mentions excluded term '{term}'"));
    }
    if let Some(term) = company.exclusions.iter().find(|t| contains_term(&text, t)) {
        return CheckResult::fail(0.0, format!("opportunity mentions company exclusion '{term}'"));
    }
    CheckResult::pass(1.0, "no excluded terms")
}

fn check_industry(opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    let opp = IndustrySignals::for_opportunity(opportunity);
    let comp = IndustrySignals::for_company(company);

    if comp.healthcare && !comp.manufacturing && opp.manufacturing && !opp.healthcare {
        return CheckResult::fail(0.0, "healthcare company vs manufacturing opportunity");
    }

    if comp.it
        && !comp.manufacturing
        && opp.manufacturing
        && !opp.it
        && !contains_any(&opportunity.search_text(), IT_CONTEXT_KEYWORDS)
    {
        return CheckResult::fail(0.0, "IT services company vs non-IT manufacturing opportunity");
    }

    if comp.construction && !comp.healthcare && opp.healthcare && !opp.construction {
        return CheckResult::fail(0.0, "construction company vs healthcare delivery opportunity");
    }

    if opp.is_unknown() || comp.is_unknown() {
        CheckResult::pass(1.0, "no sector conflict detected (limited industry signal)")
    } else {
        CheckResult::pass(1.0, "no sector conflict detected")
    }
}

/// Length of the common digit prefix, up to six
pub(crate) fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take(6)
        .take_while(|(x, y)| x == y && x.is_ascii_digit())
        .count()
}

fn check_naics(opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    let opp_code = match opportunity.naics_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => code,
        _ => return CheckResult::pass(0.5, "opportunity has no NAICS code"),
    };
    if company.naics_codes.is_empty() {
        return CheckResult::pass(0.5, "company has no NAICS codes");
    }

    let best = company
        .naics_codes
        .iter()
        .map(|code| {
            let shared = common_prefix_len(opp_code, code.trim());
            let score = if shared >= 6 && code.trim().len() == opp_code.len() {
                1.0
            } else if shared >= 4 {
                0.8
            } else if shared == 3 {
                0.6
            } else if shared == 2 {
                0.4
            } else {
                0.0
            };
            (score, code)
        })
        .fold((0.0, None), |best, (score, code)| {
            if score > best.0 {
                (score, Some(code))
            } else {
                best
            }
        });

    match best {
        (score, Some(code)) if score > 0.0 => {
            CheckResult::pass(score, format!("NAICS {code} aligns with {opp_code}"))
        }
        _ => CheckResult::fail(0.0, format!("no company NAICS shares a sector with {opp_code}")),
    }
}

fn check_keywords(opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    let opp_tokens = tokenize(&format!("{} {}", opportunity.title, opportunity.description));
    let company_tokens = tokenize(&company.search_text());
    let overlap = opp_tokens.intersection(&company_tokens).count();
    let score = overlap.min(KEYWORD_OVERLAP_CAP) as f64 / KEYWORD_OVERLAP_CAP as f64;

    if overlap >= MIN_KEYWORD_OVERLAP {
        CheckResult::pass(score, format!("{overlap} shared keywords"))
    } else {
        CheckResult::fail(score, format!("only {overlap} shared keywords"))
    }
}

fn same_place(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

fn check_geography(opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    let place = &opportunity.location;
    if place.is_unconstrained() {
        return CheckResult::pass(1.0, "no location constraint");
    }

    let state_match = company
        .locations
        .iter()
        .any(|loc| same_place(loc.state.as_deref(), place.state.as_deref()));
    let city_match = company
        .locations
        .iter()
        .any(|loc| same_place(loc.city.as_deref(), place.city.as_deref()));

    if state_match || city_match {
        return CheckResult::pass(1.0, "company operates in the place of performance");
    }
    if opportunity.is_federal() {
        return CheckResult::pass(0.8, "federal opportunity, geographic flexibility assumed");
    }
    CheckResult::pass(0.6, "no local presence, partial geographic fit")
}

fn check_size(opportunity: &Opportunity, company: &CompanyProfile) -> CheckResult {
    match (opportunity.estimated_value, company.employee_count) {
        (Some(value), Some(headcount))
            if value > LARGE_CONTRACT_VALUE && headcount < SMALL_COMPANY_HEADCOUNT =>
        {
            CheckResult::fail(
                0.3,
                format!("${value:.0} contract for a {headcount}-person company"),
            )
        }
        _ => CheckResult::pass(1.0, "size compatible"),
    }
}

fn check_deadline(opportunity: &Opportunity) -> CheckResult {
    // Full feasibility is judged downstream; only reject impossible dates
    match (opportunity.posted_date, opportunity.response_deadline) {
        (Some(posted), Some(deadline)) if deadline < posted => {
            CheckResult::fail(0.0, "response deadline precedes posting date")
        }
        _ => CheckResult::pass(1.0, "deadline acceptable"),
    }
}
