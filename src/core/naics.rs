//! Tiered NAICS alignment between an opportunity and a company.
//!
//! The primary score comes from the longest common digit prefix between the
//! opportunity code and each company code, with a relationship-table bonus
//! for codes in different sectors. When either side has no codes, a keyword
//! industry comparison stands in. The side analyses are informational and
//! never feed the numeric score.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

use crate::core::filters::common_prefix_len;
use crate::core::industry::IndustrySignals;
use crate::core::outcome::{elapsed_ms, guarded, ComponentOutcome, ComponentStatus, ScoringError};
use crate::data::naics::{self, NaicsGroup};
use crate::data::set_asides::{identify_program, rule_for};
use crate::models::{CompanyProfile, Opportunity};

/// Alignment tier, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchLevel {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "5_digit")]
    FiveDigit,
    #[serde(rename = "4_digit")]
    FourDigit,
    #[serde(rename = "3_digit")]
    ThreeDigit,
    #[serde(rename = "2_digit")]
    TwoDigit,
    #[serde(rename = "related")]
    Related,
    #[serde(rename = "industry_fallback")]
    IndustryFallback,
    #[serde(rename = "no_match")]
    NoMatch,
    #[serde(rename = "error")]
    Error,
}

impl MatchLevel {
    /// Position in the tier order; higher is better
    pub fn rank(&self) -> u8 {
        match self {
            MatchLevel::Exact => 8,
            MatchLevel::FiveDigit => 7,
            MatchLevel::FourDigit => 6,
            MatchLevel::ThreeDigit => 5,
            MatchLevel::TwoDigit => 4,
            MatchLevel::Related => 3,
            MatchLevel::IndustryFallback => 2,
            MatchLevel::NoMatch => 1,
            MatchLevel::Error => 0,
        }
    }
}

/// Alignment of one company code against the opportunity code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeAlignment {
    pub company_code: String,
    pub score: f64,
    pub match_level: MatchLevel,
    pub shared_digits: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndustryCompatibility {
    pub opportunity_sector: Option<String>,
    pub company_sectors: Vec<String>,
    pub same_sector: bool,
    pub compatible: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetAsideCompatibility {
    pub program: Option<String>,
    pub preferred_sectors: Vec<String>,
    pub opportunity_in_preferred_sector: bool,
    pub company_in_preferred_sector: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernmentReadiness {
    pub score: f64,
    pub government_friendly_codes: usize,
    pub certification_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diversification {
    pub distinct_codes: usize,
    pub distinct_sectors: usize,
    pub level: String,
}

/// Full NAICS alignment for a pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub status: ComponentStatus,
    pub overall_score: f64,
    pub match_level: MatchLevel,
    pub opportunity_naics: Option<String>,
    pub company_naics: Vec<String>,
    pub best_company_code: Option<String>,
    pub all_alignments: Vec<CodeAlignment>,
    pub industry_compatibility: IndustryCompatibility,
    pub set_aside_compatibility: SetAsideCompatibility,
    pub government_readiness: GovernmentReadiness,
    pub diversification: Diversification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: f64,
}

impl AlignmentResult {
    fn error(err: &ScoringError, processing_time_ms: f64) -> Self {
        Self {
            status: ComponentStatus::Error,
            overall_score: 0.0,
            match_level: MatchLevel::Error,
            opportunity_naics: None,
            company_naics: Vec::new(),
            best_company_code: None,
            all_alignments: Vec::new(),
            industry_compatibility: IndustryCompatibility::default(),
            set_aside_compatibility: SetAsideCompatibility::default(),
            government_readiness: GovernmentReadiness::default(),
            diversification: Diversification::default(),
            error: Some(err.to_string()),
            processing_time_ms,
        }
    }

    /// Typed outcome fed to the aggregator
    pub fn outcome(&self) -> ComponentOutcome {
        match self.status {
            ComponentStatus::Ok => ComponentOutcome::ok(self.overall_score),
            ComponentStatus::FallbackUsed => ComponentOutcome::fallback(self.overall_score),
            ComponentStatus::NoData => ComponentOutcome::no_data(self.overall_score),
            ComponentStatus::Error => ComponentOutcome::failed(&ScoringError::Internal(
                self.error.clone().unwrap_or_else(|| "naics alignment failed".to_string()),
            )),
        }
    }
}

/// Keep digits only; blank codes are dropped
fn clean_code(code: &str) -> Option<String> {
    let digits: String = code.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 2).then_some(digits)
}

/// Tiered score for one pair of codes
pub fn align_codes(opportunity_code: &str, company_code: &str) -> CodeAlignment {
    let shared = common_prefix_len(opportunity_code, company_code);
    let (score, match_level, relation) = if opportunity_code == company_code {
        (1.0, MatchLevel::Exact, None)
    } else if shared >= 5 {
        (0.9, MatchLevel::FiveDigit, None)
    } else if shared == 4 {
        (0.7, MatchLevel::FourDigit, None)
    } else if shared == 3 {
        (0.4, MatchLevel::ThreeDigit, None)
    } else if shared == 2 {
        (0.2, MatchLevel::TwoDigit, None)
    } else if naics::directly_related(opportunity_code, company_code) {
        (0.6, MatchLevel::Related, Some("direct".to_string()))
    } else if both_in(opportunity_code, company_code, NaicsGroup::InformationTechnology) {
        (0.5, MatchLevel::Related, Some("information_technology".to_string()))
    } else if both_in(opportunity_code, company_code, NaicsGroup::ProfessionalServices) {
        (0.4, MatchLevel::Related, Some("professional_services".to_string()))
    } else {
        (0.0, MatchLevel::NoMatch, None)
    };

    CodeAlignment {
        company_code: company_code.to_string(),
        score,
        match_level,
        shared_digits: shared,
        relation,
    }
}

fn both_in(a: &str, b: &str, group: NaicsGroup) -> bool {
    naics::in_group(a, group) && naics::in_group(b, group)
}

/// Higher score wins; equal scores fall back to tier order
fn compare_alignments(a: &CodeAlignment, b: &CodeAlignment) -> Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.match_level.rank().cmp(&b.match_level.rank()))
}

/// Score from keyword industries when NAICS is missing on either side
fn industry_fallback_score(opportunity: &Opportunity, company: &CompanyProfile) -> f64 {
    let opp = IndustrySignals::for_opportunity(opportunity);
    let comp = IndustrySignals::for_company(company);

    if opp.healthcare && comp.healthcare {
        0.6
    } else if opp.it && comp.it {
        0.5
    } else if comp.healthcare && opp.manufacturing {
        0.0
    } else {
        0.2
    }
}

/// Tiered industry-code matcher over the static tables in
/// [`crate::data::naics`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NaicsAligner;

impl NaicsAligner {
    pub fn new() -> Self {
        Self
    }

    /// Align a pair. Never fails: an internal panic becomes an `error`
    /// result with score 0.
    pub fn score(&self, opportunity: &Opportunity, company: &CompanyProfile) -> AlignmentResult {
        let start = Instant::now();
        match guarded("naics_alignment", || self.align(opportunity, company, start)) {
            Ok(result) => result,
            Err(err) => AlignmentResult::error(&err, elapsed_ms(start)),
        }
    }

    fn align(&self, opportunity: &Opportunity, company: &CompanyProfile, start: Instant) -> AlignmentResult {
        let opportunity_naics = opportunity.naics_code.as_deref().and_then(clean_code);

        let mut company_naics: Vec<String> = Vec::new();
        for code in company.naics_codes.iter().filter_map(|c| clean_code(c)) {
            if !company_naics.contains(&code) {
                company_naics.push(code);
            }
        }

        let (status, overall_score, match_level, best_company_code, all_alignments) =
            match opportunity_naics.as_deref() {
                Some(opp_code) if !company_naics.is_empty() => {
                    let all: Vec<CodeAlignment> = company_naics
                        .iter()
                        .map(|code| align_codes(opp_code, code))
                        .collect();
                    let best = all.iter().max_by(|a, b| compare_alignments(a, b)).cloned();
                    match best {
                        Some(best) => (
                            ComponentStatus::Ok,
                            best.score,
                            best.match_level,
                            Some(best.company_code),
                            all,
                        ),
                        None => (ComponentStatus::Ok, 0.0, MatchLevel::NoMatch, None, all),
                    }
                }
                _ => {
                    let score = industry_fallback_score(opportunity, company);
                    tracing::debug!(
                        "NAICS missing for {} / {}, industry fallback scored {}",
                        opportunity.notice_id,
                        company.company_id,
                        score
                    );
                    (
                        ComponentStatus::FallbackUsed,
                        score,
                        MatchLevel::IndustryFallback,
                        None,
                        Vec::new(),
                    )
                }
            };

        AlignmentResult {
            status,
            overall_score,
            match_level,
            industry_compatibility: industry_compatibility(opportunity_naics.as_deref(), &company_naics),
            set_aside_compatibility: set_aside_compatibility(opportunity, opportunity_naics.as_deref(), &company_naics),
            government_readiness: government_readiness(company, &company_naics),
            diversification: diversification(&company_naics),
            opportunity_naics,
            company_naics,
            best_company_code,
            all_alignments,
            error: None,
            processing_time_ms: elapsed_ms(start),
        }
    }
}

fn industry_compatibility(opportunity_code: Option<&str>, company_codes: &[String]) -> IndustryCompatibility {
    let opportunity_sector = opportunity_code.and_then(naics::sector_name).map(str::to_string);
    let mut company_sectors: Vec<String> = Vec::new();
    for name in company_codes.iter().filter_map(|c| naics::sector_name(c)) {
        if !company_sectors.iter().any(|s| s == name) {
            company_sectors.push(name.to_string());
        }
    }

    let opp_key = opportunity_code.and_then(naics::sector_key);
    let same_sector = opp_key.is_some()
        && company_codes.iter().any(|c| naics::sector_key(c) == opp_key);
    let related = opportunity_code.is_some_and(|opp| {
        company_codes
            .iter()
            .any(|c| align_codes(opp, c).match_level == MatchLevel::Related)
    });

    IndustryCompatibility {
        opportunity_sector,
        company_sectors,
        same_sector,
        compatible: same_sector || related,
    }
}

fn set_aside_compatibility(
    opportunity: &Opportunity,
    opportunity_code: Option<&str>,
    company_codes: &[String],
) -> SetAsideCompatibility {
    let Some(program) = opportunity.set_aside.as_deref().and_then(identify_program) else {
        return SetAsideCompatibility::default();
    };
    let rule = rule_for(program);
    let preferred = |code: &str| code.get(..2).is_some_and(|p| rule.preferred_sectors.contains(&p));

    SetAsideCompatibility {
        program: Some(program.as_str().to_string()),
        preferred_sectors: rule.preferred_sectors.iter().map(|s| s.to_string()).collect(),
        opportunity_in_preferred_sector: opportunity_code.is_some_and(preferred),
        company_in_preferred_sector: company_codes.iter().any(|c| preferred(c)),
    }
}

fn government_readiness(company: &CompanyProfile, company_codes: &[String]) -> GovernmentReadiness {
    let friendly = company_codes
        .iter()
        .filter(|c| naics::is_government_friendly(c))
        .count();
    let friendly_ratio = if company_codes.is_empty() {
        0.0
    } else {
        friendly as f64 / company_codes.len() as f64
    };
    let certification_count = company.certifications.len();
    let cert_ratio = certification_count.min(3) as f64 / 3.0;

    GovernmentReadiness {
        score: (0.6 * friendly_ratio + 0.4 * cert_ratio).min(1.0),
        government_friendly_codes: friendly,
        certification_count,
    }
}

fn diversification(company_codes: &[String]) -> Diversification {
    let mut sectors: Vec<&str> = company_codes
        .iter()
        .filter_map(|c| naics::sector_key(c))
        .collect();
    sectors.sort_unstable();
    sectors.dedup();

    let level = match sectors.len() {
        0 => "unknown",
        1 => "focused",
        2 => "moderate",
        _ => "diversified",
    };

    Diversification {
        distinct_codes: company_codes.len(),
        distinct_sectors: sectors.len(),
        level: level.to_string(),
    }
}
