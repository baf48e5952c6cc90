//! Field-normalisation adapter
//!
//! Opportunity and company records arrive from several feeds, each with its
//! own spelling of the same field (`NaicsCode`, `naics_code`, `NAICS`, ...)
//! and its own encoding of dates, money and nested values. This module maps
//! them onto the canonical [`Opportunity`] and [`CompanyProfile`] so the
//! scorers only ever see one schema.
//!
//! Only a missing identifier is an error. Every other gap becomes `None` or
//! an empty collection, which the scorers treat neutrally.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::domain::{default_status, default_tenant, CompanyProfile, Location, Opportunity};
use crate::core::outcome::ScoringError;

const OPPORTUNITY_ID: &[&str] = &["notice_id", "noticeId", "NoticeId", "solicitation_number", "id"];
const OPPORTUNITY_NAICS: &[&str] = &["naics_code", "NaicsCode", "naicsCode", "NAICS", "naics"];
const SET_ASIDE: &[&str] = &["set_aside", "SetAside", "typeOfSetAside", "setAsideCode", "type_of_set_aside"];
const POSTED_DATE: &[&str] = &["posted_date", "PostedDate", "postedDate"];
const DEADLINE: &[&str] = &["response_deadline", "ResponseDeadLine", "responseDeadline", "deadline"];
const AGENCY: &[&str] = &["agency", "Agency", "department", "office", "Office", "fullParentPathName"];
const OFFICE: &[&str] = &["office", "Office", "subTier"];
const CONTRACT_VALUE: &[&str] = &["estimated_value", "award_amount", "contract_value", "value"];

const COMPANY_ID: &[&str] = &["company_id", "companyId", "CompanyId", "id"];
const COMPANY_NAICS: &[&str] = &["naics_codes", "naicsCodes", "NaicsCodes", "naics", "NAICS"];
const CERTIFICATIONS: &[&str] = &["certifications", "Certifications", "certs"];
const CAPABILITY: &[&str] = &["capability_statement", "capabilityStatement", "capabilities", "description"];
const EMPLOYEES: &[&str] = &["employee_count", "employeeCount", "employees", "num_employees"];
const ACTIVE: &[&str] = &["active_status", "activeStatus", "is_active", "active"];

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// First populated value among `keys`; nulls and blank strings are skipped
fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(a) => !a.is_empty(),
            _ => true,
        })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first(obj, keys).and_then(scalar_text)
}

/// A NAICS value: string, number, `{code}` object or a list of those
fn naics_of(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(naics_of),
        Value::Object(obj) => text(obj, &["code", "Code", "naics_code"]),
        other => scalar_text(other).map(|s| s.trim_end_matches(".0").to_string()),
    }
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or `MM/DD/YYYY`
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

fn date(obj: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    first(obj, keys).and_then(Value::as_str).and_then(parse_date)
}

/// Parse a number or a money string such as `"$1,250,000"`
pub fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace([',', ' '], "")
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    amount.filter(|v| v.is_finite() && *v >= 0.0)
}

/// `{state, city}`, `{state: {code}, city: {name}}` or `"City, ST"`
fn location_of(value: &Value) -> Option<Location> {
    let location = match value {
        Value::String(s) => {
            let mut parts = s.rsplitn(2, ',').map(str::trim);
            let last = parts.next().filter(|p| !p.is_empty());
            match parts.next().filter(|p| !p.is_empty()) {
                Some(city) => Location::new(last, Some(city)),
                None => Location::new(last, None),
            }
        }
        Value::Object(obj) => {
            let nested = |keys: &[&str], inner: &[&str]| {
                first(obj, keys).and_then(|v| match v {
                    Value::Object(o) => text(o, inner),
                    other => scalar_text(other),
                })
            };
            Location {
                state: nested(&["state", "State"], &["code", "name"]),
                city: nested(&["city", "City"], &["name", "code"]),
            }
        }
        _ => return None,
    };
    (!location.is_unconstrained()).then_some(location)
}

fn opportunity_location(obj: &Map<String, Value>) -> Location {
    first(obj, &["place_of_performance", "placeOfPerformance", "location"])
        .and_then(location_of)
        .unwrap_or_else(|| Location {
            state: text(obj, &["state", "State"]),
            city: text(obj, &["city", "City"]),
        })
}

fn string_list(value: &Value, object_keys: &[&str]) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(o) => text(o, object_keys),
                other => scalar_text(other),
            })
            .collect(),
        Value::String(s) => s
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn push_unique(codes: &mut Vec<String>, code: String) {
    if !codes.contains(&code) {
        codes.push(code);
    }
}

/// Flat list, list of `{code}` objects, or `{primary, secondary[]}`;
/// deduplicated in first-seen order
fn company_naics(value: &Value) -> Vec<String> {
    let mut codes = Vec::new();
    match value {
        Value::Object(obj) => {
            if let Some(primary) = obj.get("primary").and_then(naics_of) {
                push_unique(&mut codes, primary);
            }
            if let Some(secondary) = obj.get("secondary") {
                for code in string_list(secondary, &["code"]) {
                    push_unique(&mut codes, code);
                }
            }
        }
        other => {
            for code in string_list(other, &["code", "naics_code"]) {
                push_unique(&mut codes, code.trim_end_matches(".0").to_string());
            }
        }
    }
    codes
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "active" => Some(true),
            "false" | "no" | "0" | "inactive" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn object<'a>(raw: &'a Value, what: &str) -> Result<&'a Map<String, Value>, ScoringError> {
    raw.as_object()
        .ok_or_else(|| ScoringError::Input(format!("{what} must be a JSON object")))
}

impl Opportunity {
    /// Build an opportunity from any supported feed shape
    pub fn from_json(raw: &Value) -> Result<Self, ScoringError> {
        let obj = object(raw, "opportunity")?;
        let notice_id = text(obj, OPPORTUNITY_ID)
            .ok_or_else(|| ScoringError::Input("opportunity has no notice_id".to_string()))?;

        let agency = text(obj, AGENCY);
        let office = text(obj, OFFICE).filter(|o| Some(o) != agency.as_ref());

        Ok(Self {
            notice_id,
            title: text(obj, &["title", "Title"]).unwrap_or_default(),
            description: text(obj, &["description", "Description", "synopsis"]).unwrap_or_default(),
            naics_code: first(obj, OPPORTUNITY_NAICS).and_then(naics_of),
            set_aside: text(obj, SET_ASIDE),
            posted_date: date(obj, POSTED_DATE),
            response_deadline: date(obj, DEADLINE),
            agency,
            office,
            location: opportunity_location(obj),
            estimated_value: first(obj, CONTRACT_VALUE).and_then(parse_amount),
            requirements: text(obj, &["requirements", "Requirements", "statement_of_work"]),
        })
    }
}

impl CompanyProfile {
    /// Build a company profile from any supported feed shape
    pub fn from_json(raw: &Value) -> Result<Self, ScoringError> {
        let obj = object(raw, "company")?;
        let company_id = text(obj, COMPANY_ID)
            .ok_or_else(|| ScoringError::Input("company has no company_id".to_string()))?;

        let mut locations: Vec<Location> = first(obj, &["locations", "Locations", "offices"])
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(location_of).collect())
            .unwrap_or_default();
        if locations.is_empty() {
            let flat = Location {
                state: text(obj, &["state", "State"]),
                city: text(obj, &["city", "City"]),
            };
            if !flat.is_unconstrained() {
                locations.push(flat);
            }
        }

        let documents: BTreeMap<String, String> = obj
            .get("documents")
            .and_then(Value::as_object)
            .map(|docs| {
                docs.iter()
                    .filter_map(|(name, doc)| {
                        let body = match doc {
                            Value::Object(o) => text(o, &["text", "content", "body"]),
                            other => scalar_text(other),
                        };
                        body.map(|b| (name.clone(), b))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let employee_count = first(obj, EMPLOYEES)
            .and_then(parse_amount)
            .filter(|n| *n <= u32::MAX as f64)
            .map(|n| n.round() as u32);

        Ok(Self {
            company_id,
            tenant_id: text(obj, &["tenant_id", "tenantId", "tenant"]).unwrap_or_else(default_tenant),
            name: text(obj, &["name", "company_name", "companyName", "legal_name"]).unwrap_or_default(),
            naics_codes: first(obj, COMPANY_NAICS).map(company_naics).unwrap_or_default(),
            certifications: first(obj, CERTIFICATIONS)
                .map(|v| string_list(v, &["name", "type", "code"]))
                .unwrap_or_default(),
            capability_statement: first(obj, CAPABILITY)
                .and_then(scalar_text)
                .unwrap_or_default(),
            documents,
            locations,
            employee_count,
            active_status: first(obj, ACTIVE).and_then(as_bool).unwrap_or(true),
            status: text(obj, &["status", "Status"])
                .map(|s| s.to_lowercase())
                .unwrap_or_else(default_status),
            industry: text(obj, &["industry", "Industry"]),
            exclusions: first(obj, &["exclusions", "excluded_keywords"])
                .map(|v| string_list(v, &["term", "keyword"]))
                .unwrap_or_default(),
        })
    }
}
