//! Keyword sets used by the quick filter and the industry fallback.

/// Terms that disqualify an opportunity outright
pub static EXCLUSION_TERMS: &[&str] = &[
    "nuclear",
    "classified",
    "top secret",
    "ts/sci",
    "munitions",
    "explosives",
];

/// Words dropped before keyword overlap is measured
pub static STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "will", "shall",
    "have", "has", "had", "not", "but", "all", "any", "can", "our", "your", "their", "its", "into",
    "upon", "such", "other", "than", "then", "also", "which", "who", "whom", "these", "those",
    "each", "per", "via", "may", "must", "should", "would", "could", "been", "being", "under",
    "over", "within", "without", "about", "more", "most", "only", "own", "same", "very", "what",
    "when", "where", "why", "how", "both", "between", "through", "during", "before", "after",
    "above", "below", "out", "off", "again", "further", "once", "here", "there", "services",
    "service", "provide", "provides", "providing", "support", "government", "contract",
    "contractor", "company", "inc", "llc", "corp",
];

pub static HEALTHCARE_KEYWORDS: &[&str] = &[
    "healthcare",
    "health care",
    "medical",
    "clinical",
    "hospital",
    "patient",
    "nursing",
    "physician",
    "pharmacy",
    "telehealth",
];

pub static IT_KEYWORDS: &[&str] = &[
    "software",
    "information technology",
    "cloud",
    "cybersecurity",
    "cyber",
    "network",
    "database",
    "devops",
    "application development",
    "it services",
    "data analytics",
    "systems integration",
];

pub static MANUFACTURING_KEYWORDS: &[&str] = &[
    "manufacturing",
    "fabrication",
    "machining",
    "assembly line",
    "production line",
    "casting",
    "welding",
    "forging",
];

pub static CONSTRUCTION_KEYWORDS: &[&str] = &[
    "construction",
    "renovation",
    "paving",
    "roofing",
    "concrete",
    "general contractor",
];

/// Signals that a manufacturing opportunity still needs IT work
pub static IT_CONTEXT_KEYWORDS: &[&str] = &[
    "software",
    "system",
    "systems",
    "network",
    "data",
    "cyber",
    "it support",
    "integration",
    "automation",
    "firmware",
];

/// Markers of a federal buyer
pub static FEDERAL_MARKERS: &[&str] = &[
    "department of",
    "dept of",
    "federal",
    "u.s.",
    "united states",
    "usda",
    "dod",
    "gsa",
    "nasa",
    "army",
    "navy",
    "air force",
    "veterans affairs",
    "homeland security",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_sets_are_lowercase() {
        for set in [
            EXCLUSION_TERMS,
            STOPWORDS,
            HEALTHCARE_KEYWORDS,
            IT_KEYWORDS,
            MANUFACTURING_KEYWORDS,
            CONSTRUCTION_KEYWORDS,
            IT_CONTEXT_KEYWORDS,
            FEDERAL_MARKERS,
        ] {
            for word in set {
                assert_eq!(*word, word.to_lowercase());
            }
        }
    }
}
