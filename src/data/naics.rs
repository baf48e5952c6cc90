//! NAICS seed hierarchy and sector names.
//!
//! The table is intentionally small: it covers the codes that dominate
//! federal services procurement. Codes outside it still align by digit
//! prefix; the table only adds relationship bonuses and side analyses.

/// Relationship group a seed code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaicsGroup {
    InformationTechnology,
    ProfessionalServices,
    Facilities,
    Construction,
    Healthcare,
    Manufacturing,
    Education,
}

/// One entry of the seed hierarchy
#[derive(Debug, Clone, Copy)]
pub struct NaicsEntry {
    pub code: &'static str,
    pub title: &'static str,
    pub related_codes: &'static [&'static str],
    pub groups: &'static [NaicsGroup],
    pub government_friendly: bool,
}

use NaicsGroup::*;

pub static NAICS_HIERARCHY: &[NaicsEntry] = &[
    NaicsEntry {
        code: "541511",
        title: "Custom Computer Programming Services",
        related_codes: &["541512", "541519", "518210"],
        groups: &[InformationTechnology],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541512",
        title: "Computer Systems Design Services",
        related_codes: &["541511", "541513", "541519", "518210"],
        groups: &[InformationTechnology],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541513",
        title: "Computer Facilities Management Services",
        related_codes: &["541512", "518210", "561210"],
        groups: &[InformationTechnology, Facilities],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541519",
        title: "Other Computer Related Services",
        related_codes: &["541511", "541512"],
        groups: &[InformationTechnology],
        government_friendly: true,
    },
    NaicsEntry {
        code: "518210",
        title: "Computing Infrastructure Providers, Data Processing, Web Hosting",
        related_codes: &["541512", "541513", "519290"],
        groups: &[InformationTechnology],
        government_friendly: true,
    },
    NaicsEntry {
        code: "519290",
        title: "Web Search Portals and All Other Information Services",
        related_codes: &["518210"],
        groups: &[InformationTechnology],
        government_friendly: false,
    },
    NaicsEntry {
        code: "541330",
        title: "Engineering Services",
        related_codes: &["541310", "541715", "237310"],
        groups: &[ProfessionalServices],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541310",
        title: "Architectural Services",
        related_codes: &["541330", "236220"],
        groups: &[ProfessionalServices, Construction],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541611",
        title: "Administrative Management and General Management Consulting Services",
        related_codes: &["541612", "541618", "541690"],
        groups: &[ProfessionalServices],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541612",
        title: "Human Resources Consulting Services",
        related_codes: &["541611", "561320"],
        groups: &[ProfessionalServices],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541618",
        title: "Other Management Consulting Services",
        related_codes: &["541611"],
        groups: &[ProfessionalServices],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541690",
        title: "Other Scientific and Technical Consulting Services",
        related_codes: &["541611", "541715", "541330"],
        groups: &[ProfessionalServices],
        government_friendly: true,
    },
    NaicsEntry {
        code: "541715",
        title: "Research and Development in the Physical, Engineering, and Life Sciences",
        related_codes: &["541330", "541690"],
        groups: &[ProfessionalServices],
        government_friendly: true,
    },
    NaicsEntry {
        code: "561210",
        title: "Facilities Support Services",
        related_codes: &["541513", "238210"],
        groups: &[Facilities],
        government_friendly: true,
    },
    NaicsEntry {
        code: "561320",
        title: "Temporary Help Services",
        related_codes: &["541612"],
        groups: &[ProfessionalServices],
        government_friendly: true,
    },
    NaicsEntry {
        code: "236220",
        title: "Commercial and Institutional Building Construction",
        related_codes: &["238210", "541310"],
        groups: &[Construction],
        government_friendly: true,
    },
    NaicsEntry {
        code: "237310",
        title: "Highway, Street, and Bridge Construction",
        related_codes: &["236220", "541330"],
        groups: &[Construction],
        government_friendly: true,
    },
    NaicsEntry {
        code: "238210",
        title: "Electrical Contractors and Other Wiring Installation Contractors",
        related_codes: &["236220", "561210"],
        groups: &[Construction, Facilities],
        government_friendly: true,
    },
    NaicsEntry {
        code: "621111",
        title: "Offices of Physicians (except Mental Health Specialists)",
        related_codes: &["622110", "621999"],
        groups: &[Healthcare],
        government_friendly: false,
    },
    NaicsEntry {
        code: "621999",
        title: "All Other Miscellaneous Ambulatory Health Care Services",
        related_codes: &["621111", "622110"],
        groups: &[Healthcare],
        government_friendly: true,
    },
    NaicsEntry {
        code: "622110",
        title: "General Medical and Surgical Hospitals",
        related_codes: &["621111", "621999"],
        groups: &[Healthcare],
        government_friendly: false,
    },
    NaicsEntry {
        code: "336411",
        title: "Aircraft Manufacturing",
        related_codes: &["336413", "541330"],
        groups: &[Manufacturing],
        government_friendly: true,
    },
    NaicsEntry {
        code: "334111",
        title: "Electronic Computer Manufacturing",
        related_codes: &["541512"],
        groups: &[Manufacturing, InformationTechnology],
        government_friendly: true,
    },
    NaicsEntry {
        code: "611430",
        title: "Professional and Management Development Training",
        related_codes: &["541611", "611420"],
        groups: &[Education, ProfessionalServices],
        government_friendly: true,
    },
];

/// Two-digit sector names. Manufacturing and transportation span several
/// prefixes.
pub static SECTOR_NAMES: &[(&str, &str)] = &[
    ("11", "Agriculture, Forestry, Fishing and Hunting"),
    ("21", "Mining, Quarrying, and Oil and Gas Extraction"),
    ("22", "Utilities"),
    ("23", "Construction"),
    ("31", "Manufacturing"),
    ("32", "Manufacturing"),
    ("33", "Manufacturing"),
    ("42", "Wholesale Trade"),
    ("44", "Retail Trade"),
    ("45", "Retail Trade"),
    ("48", "Transportation and Warehousing"),
    ("49", "Transportation and Warehousing"),
    ("51", "Information"),
    ("52", "Finance and Insurance"),
    ("53", "Real Estate and Rental and Leasing"),
    ("54", "Professional, Scientific, and Technical Services"),
    ("55", "Management of Companies and Enterprises"),
    ("56", "Administrative and Support and Waste Management Services"),
    ("61", "Educational Services"),
    ("62", "Health Care and Social Assistance"),
    ("71", "Arts, Entertainment, and Recreation"),
    ("72", "Accommodation and Food Services"),
    ("81", "Other Services (except Public Administration)"),
    ("92", "Public Administration"),
];

/// Sectors that federal agencies buy from heavily
pub static GOVERNMENT_FRIENDLY_SECTORS: &[&str] = &["23", "54", "56", "51", "33", "92"];

/// Look up a seed code
pub fn lookup(code: &str) -> Option<&'static NaicsEntry> {
    NAICS_HIERARCHY.iter().find(|e| e.code == code)
}

/// Sector name for the two-digit prefix of `code`
pub fn sector_name(code: &str) -> Option<&'static str> {
    let prefix = code.get(..2)?;
    SECTOR_NAMES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, name)| *name)
}

/// Normalised sector key, folding the multi-prefix sectors together
pub fn sector_key(code: &str) -> Option<&'static str> {
    let prefix = code.get(..2)?;
    let key = match prefix {
        "31" | "32" | "33" => "31-33",
        "44" | "45" => "44-45",
        "48" | "49" => "48-49",
        _ => SECTOR_NAMES.iter().find(|(p, _)| *p == prefix)?.0,
    };
    Some(key)
}

/// True when the code (or its sector) is flagged government friendly
pub fn is_government_friendly(code: &str) -> bool {
    if let Some(entry) = lookup(code) {
        return entry.government_friendly;
    }
    code.get(..2)
        .map(|p| GOVERNMENT_FRIENDLY_SECTORS.contains(&p))
        .unwrap_or(false)
}

/// True when `code` belongs to `group`, either as a seed entry or by the
/// prefix families the group is known for
pub fn in_group(code: &str, group: NaicsGroup) -> bool {
    if let Some(entry) = lookup(code) {
        if entry.groups.contains(&group) {
            return true;
        }
    }
    match group {
        InformationTechnology => code.starts_with("5415") || code.starts_with("518"),
        ProfessionalServices => code.starts_with("5416") || code.starts_with("5417"),
        Healthcare => code.starts_with("62"),
        Construction => code.starts_with("23"),
        Manufacturing => {
            code.starts_with("31") || code.starts_with("32") || code.starts_with("33")
        }
        Facilities => code.starts_with("5612"),
        Education => code.starts_with("61"),
    }
}

/// True when either code lists the other as related
pub fn directly_related(a: &str, b: &str) -> bool {
    lookup(a).is_some_and(|e| e.related_codes.contains(&b))
        || lookup(b).is_some_and(|e| e.related_codes.contains(&a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_codes_are_six_digits() {
        for entry in NAICS_HIERARCHY {
            assert_eq!(entry.code.len(), 6, "{}", entry.code);
            assert!(entry.code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_sector_lookup() {
        assert_eq!(sector_name("541511"), Some("Professional, Scientific, and Technical Services"));
        assert_eq!(sector_key("336411"), Some("31-33"));
        assert_eq!(sector_key("9"), None);
    }

    #[test]
    fn test_relationships_are_symmetric_in_lookup() {
        assert!(directly_related("541511", "518210"));
        assert!(directly_related("518210", "541511"));
        assert!(!directly_related("541511", "622110"));
    }

    #[test]
    fn test_group_membership_falls_back_to_prefix() {
        assert!(in_group("541599", NaicsGroup::InformationTechnology));
        assert!(in_group("541720", NaicsGroup::ProfessionalServices));
        assert!(!in_group("236220", NaicsGroup::InformationTechnology));
    }
}
