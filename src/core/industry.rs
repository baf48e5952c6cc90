use serde::Serialize;

use crate::core::text::contains_any;
use crate::data::keywords::{
    CONSTRUCTION_KEYWORDS, HEALTHCARE_KEYWORDS, IT_KEYWORDS, MANUFACTURING_KEYWORDS,
};
use crate::data::naics::{in_group, NaicsGroup};
use crate::models::{CompanyProfile, Opportunity};

/// Coarse industry signals detected from NAICS sectors and keywords
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndustrySignals {
    pub healthcare: bool,
    pub it: bool,
    pub manufacturing: bool,
    pub construction: bool,
}

impl IndustrySignals {
    fn from_parts(codes: &[&str], text: &str) -> Self {
        let has = |group| codes.iter().any(|c| in_group(c, group));
        Self {
            healthcare: has(NaicsGroup::Healthcare) || contains_any(text, HEALTHCARE_KEYWORDS),
            it: has(NaicsGroup::InformationTechnology) || contains_any(text, IT_KEYWORDS),
            manufacturing: has(NaicsGroup::Manufacturing)
                || contains_any(text, MANUFACTURING_KEYWORDS),
            construction: has(NaicsGroup::Construction)
                || contains_any(text, CONSTRUCTION_KEYWORDS),
        }
    }

    pub fn for_opportunity(opportunity: &Opportunity) -> Self {
        let codes: Vec<&str> = opportunity.naics_code.as_deref().into_iter().collect();
        Self::from_parts(&codes, &opportunity.search_text())
    }

    pub fn for_company(company: &CompanyProfile) -> Self {
        let codes: Vec<&str> = company.naics_codes.iter().map(String::as_str).collect();
        Self::from_parts(&codes, &company.search_text())
    }

    /// True when no signal fired
    pub fn is_unknown(&self) -> bool {
        !(self.healthcare || self.it || self.manufacturing || self.construction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signals_from_naics_and_text() {
        let mut opp = Opportunity::new("N1", "Turbine blade machining", "Precision fabrication");
        opp.naics_code = Some("336411".to_string());
        let signals = IndustrySignals::for_opportunity(&opp);
        assert!(signals.manufacturing);
        assert!(!signals.healthcare);

        let mut company = CompanyProfile::new("c1", "Acme Health");
        company.capability_statement = "Clinical staffing for hospital systems".to_string();
        let signals = IndustrySignals::for_company(&company);
        assert!(signals.healthcare);
        assert!(!signals.manufacturing);
    }

    #[test]
    fn test_unknown_signals() {
        let opp = Opportunity::new("N1", "Janitorial", "Office cleaning");
        assert!(IndustrySignals::for_opportunity(&opp).is_unknown());
    }
}
