//! Set-aside programs, the keywords that identify them and the sectors
//! each program tends to favour.

/// A socio-economic set-aside program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetAsideProgram {
    EightA,
    Wosb,
    Sdvosb,
    Vosb,
    HubZone,
    SmallBusiness,
}

impl SetAsideProgram {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetAsideProgram::EightA => "8(a)",
            SetAsideProgram::Wosb => "WOSB",
            SetAsideProgram::Sdvosb => "SDVOSB",
            SetAsideProgram::Vosb => "VOSB",
            SetAsideProgram::HubZone => "HUBZone",
            SetAsideProgram::SmallBusiness => "Small Business",
        }
    }
}

/// Keyword table row: program, opportunity-side keywords, company
/// certification keywords, preferred two-digit sectors
#[derive(Debug, Clone, Copy)]
pub struct SetAsideRule {
    pub program: SetAsideProgram,
    pub opportunity_keywords: &'static [&'static str],
    pub certification_keywords: &'static [&'static str],
    pub preferred_sectors: &'static [&'static str],
}

/// Ordered so that the more specific programs are tried first: SDVOSB text
/// contains "vosb" and every program is also a small-business program.
pub static SET_ASIDE_RULES: &[SetAsideRule] = &[
    SetAsideRule {
        program: SetAsideProgram::Sdvosb,
        opportunity_keywords: &["sdvosb", "service-disabled", "service disabled"],
        certification_keywords: &["sdvosb", "service-disabled", "service disabled"],
        preferred_sectors: &["23", "54", "56"],
    },
    SetAsideRule {
        program: SetAsideProgram::Vosb,
        opportunity_keywords: &["vosb", "veteran-owned", "veteran owned"],
        certification_keywords: &[
            "vosb",
            "veteran-owned",
            "veteran owned",
            "sdvosb",
            "service-disabled",
            "service disabled",
        ],
        preferred_sectors: &["23", "54", "56"],
    },
    SetAsideRule {
        program: SetAsideProgram::Wosb,
        opportunity_keywords: &["wosb", "edwosb", "women-owned", "woman-owned", "women owned", "woman owned"],
        certification_keywords: &["wosb", "edwosb", "women-owned", "woman-owned", "women owned", "woman owned"],
        preferred_sectors: &["54", "56", "62"],
    },
    SetAsideRule {
        program: SetAsideProgram::HubZone,
        opportunity_keywords: &["hubzone", "hub zone"],
        certification_keywords: &["hubzone", "hub zone"],
        preferred_sectors: &["23", "31", "32", "33", "56"],
    },
    SetAsideRule {
        program: SetAsideProgram::EightA,
        opportunity_keywords: &["8(a)", "8a", "eight a"],
        certification_keywords: &["8(a)", "8a"],
        preferred_sectors: &["23", "54", "56"],
    },
    SetAsideRule {
        program: SetAsideProgram::SmallBusiness,
        opportunity_keywords: &["small business", "total small", "partial small", "sba"],
        certification_keywords: SMALL_BUSINESS_CERTIFICATIONS,
        preferred_sectors: &["23", "54", "56", "51"],
    },
];

/// Any of these in a company certification counts as small-business
/// flavoured
pub static SMALL_BUSINESS_CERTIFICATIONS: &[&str] = &[
    "small business",
    "small disadvantaged",
    "sdb",
    "8(a)",
    "8a",
    "wosb",
    "edwosb",
    "women-owned",
    "woman-owned",
    "sdvosb",
    "vosb",
    "veteran-owned",
    "service-disabled",
    "hubzone",
    "hub zone",
];

/// Set-aside strings that mean "no restriction"
pub static UNRESTRICTED_MARKERS: &[&str] = &[
    "none",
    "n/a",
    "na",
    "unrestricted",
    "full and open",
    "no set aside used",
    "no set-aside used",
];

/// Identify the program an opportunity set-aside string refers to
pub fn identify_program(set_aside: &str) -> Option<SetAsideProgram> {
    let text = set_aside.trim().to_lowercase();
    if text.is_empty() || UNRESTRICTED_MARKERS.contains(&text.as_str()) {
        return None;
    }
    SET_ASIDE_RULES
        .iter()
        .find(|rule| {
            rule.opportunity_keywords
                .iter()
                .any(|kw| keyword_in(&text, kw))
        })
        .map(|rule| rule.program)
}

/// Rule row for `program`
pub fn rule_for(program: SetAsideProgram) -> &'static SetAsideRule {
    SET_ASIDE_RULES
        .iter()
        .find(|rule| rule.program == program)
        .unwrap_or(&SET_ASIDE_RULES[SET_ASIDE_RULES.len() - 1])
}

/// First company certification that satisfies `program`
pub fn satisfying_certification(program: SetAsideProgram, certifications: &[String]) -> Option<&String> {
    let rule = rule_for(program);
    certifications.iter().find(|cert| {
        let cert = cert.to_lowercase();
        rule.certification_keywords
            .iter()
            .any(|kw| keyword_in(&cert, kw))
    })
}

/// Whether a certification names any known program
pub fn is_recognised_certification(certification: &str) -> bool {
    let cert = certification.to_lowercase();
    SET_ASIDE_RULES.iter().any(|rule| {
        rule.certification_keywords
            .iter()
            .any(|kw| keyword_in(&cert, kw))
    })
}

/// Keyword containment where short alphanumeric keywords must stand on
/// their own ("8a" must not match "18a1")
pub(crate) fn keyword_in(text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    if keyword.len() > 4 || !keyword.chars().all(|c| c.is_ascii_alphanumeric()) {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == keyword)
}
