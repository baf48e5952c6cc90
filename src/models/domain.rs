use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::keywords::FEDERAL_MARKERS;

/// Place of performance or company site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl Location {
    pub fn new(state: Option<&str>, city: Option<&str>) -> Self {
        Self {
            state: state.map(str::to_string),
            city: city.map(str::to_string),
        }
    }

    /// True when neither state nor city is known
    pub fn is_unconstrained(&self) -> bool {
        self.state.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.city.as_deref().map_or(true, |c| c.trim().is_empty())
    }
}

/// Contract opportunity in canonical form
///
/// Feeds use many spellings for the same field; see
/// [`crate::models::normalize`] for the adapter that produces this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub notice_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub naics_code: Option<String>,
    #[serde(default)]
    pub set_aside: Option<String>,
    #[serde(default)]
    pub posted_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub office: Option<String>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub requirements: Option<String>,
}

impl Opportunity {
    /// Minimal opportunity, mostly useful for tests and fixtures
    pub fn new(notice_id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            notice_id: notice_id.into(),
            title: title.into(),
            description: description.into(),
            naics_code: None,
            set_aside: None,
            posted_date: None,
            response_deadline: None,
            agency: None,
            office: None,
            location: Location::default(),
            estimated_value: None,
            requirements: None,
        }
    }

    /// Title and description, lowercased, for keyword checks
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }

    /// Agency and office joined
    pub fn buyer(&self) -> String {
        [self.agency.as_deref(), self.office.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" / ")
    }

    /// Whether the buying office looks like a federal agency
    pub fn is_federal(&self) -> bool {
        let buyer = self.buyer().to_lowercase();
        !buyer.is_empty() && FEDERAL_MARKERS.iter().any(|m| buyer.contains(m))
    }
}

/// Company profile in canonical form. Read-only to the matching core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub company_id: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub naics_codes: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub capability_statement: String,
    #[serde(default)]
    pub documents: BTreeMap<String, String>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub employee_count: Option<u32>,
    #[serde(default = "default_true")]
    pub active_status: bool,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

pub(crate) fn default_tenant() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

pub(crate) fn default_status() -> String {
    "active".to_string()
}

impl CompanyProfile {
    /// Minimal active company, mostly useful for tests and fixtures
    pub fn new(company_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            tenant_id: default_tenant(),
            name: name.into(),
            naics_codes: Vec::new(),
            certifications: Vec::new(),
            capability_statement: String::new(),
            documents: BTreeMap::new(),
            locations: Vec::new(),
            employee_count: None,
            active_status: true,
            status: default_status(),
            industry: None,
            exclusions: Vec::new(),
        }
    }

    /// Name, capability statement, industry and certifications, lowercased
    pub fn search_text(&self) -> String {
        let mut text = format!("{} {}", self.name, self.capability_statement);
        if let Some(industry) = &self.industry {
            text.push(' ');
            text.push_str(industry);
        }
        for cert in &self.certifications {
            text.push(' ');
            text.push_str(cert);
        }
        text.to_lowercase()
    }

    /// A named document, if present and non-blank
    pub fn document(&self, name: &str) -> Option<&str> {
        self.documents
            .get(name)
            .map(String::as_str)
            .filter(|d| !d.trim().is_empty())
    }
}

/// Bucketed confidence in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// One step lower, saturating at `Low`
    pub fn lowered(self) -> Self {
        match self {
            ConfidenceLevel::High => ConfidenceLevel::Medium,
            ConfidenceLevel::Medium | ConfidenceLevel::Low => ConfidenceLevel::Low,
        }
    }
}

/// Aggregated opportunity ↔ company match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub opportunity_id: String,
    pub company_id: String,
    pub tenant_id: String,
    pub is_potential_match: bool,
    pub component_scores: BTreeMap<String, crate::core::ComponentScore>,
    pub total_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub match_reasons: Vec<String>,
    pub degraded_components: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Identity of a scored pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub opportunity_id: String,
    pub company_id: String,
}

impl PairKey {
    pub fn new(opportunity: &Opportunity, company: &CompanyProfile) -> Self {
        Self {
            opportunity_id: opportunity.notice_id.clone(),
            company_id: company.company_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_federal_detection() {
        let mut opp = Opportunity::new("N1", "Help desk", "Tier 1 support");
        assert!(!opp.is_federal());

        opp.agency = Some("Department of Veterans Affairs".to_string());
        assert!(opp.is_federal());

        opp.agency = Some("City of Austin".to_string());
        assert!(!opp.is_federal());
    }

    #[test]
    fn test_company_defaults_from_json() {
        let company: CompanyProfile =
            serde_json::from_value(serde_json::json!({ "company_id": "c1" })).unwrap();
        assert_eq!(company.tenant_id, "default");
        assert!(company.active_status);
        assert_eq!(company.status, "active");
    }

    #[test]
    fn test_confidence_lowered() {
        assert_eq!(ConfidenceLevel::High.lowered(), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::Low.lowered(), ConfidenceLevel::Low);
        assert_eq!(serde_json::to_string(&ConfidenceLevel::High).unwrap(), "\"HIGH\"");
    }
}
