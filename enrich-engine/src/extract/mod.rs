//! Page Extractor
//!
//! Turns fetched HTML (or a rendered page) into unverified field candidates.
//! Confidence reflects how structured the evidence was: schema.org JSON-LD
//! and meta tags score close to the tier's base confidence, free-text pattern
//! matches score well below it. Nothing here is verified; the validator
//! decides what survives.

pub mod signals;

use crate::types::{FieldData, FieldName, RawField, RawFields, SourceId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Page content
// ============================================================================

/// Structured view of one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub title: Option<String>,
    /// `name`/`property` (lower-cased) → `content`
    pub meta: BTreeMap<String, String>,
    /// Visible text, whitespace-collapsed
    pub text: String,
    pub links: Vec<String>,
    /// Parsed JSON-LD objects (arrays and `@graph` flattened)
    pub structured_data: Vec<Value>,
    pub script_sources: Vec<String>,
}

static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("valid regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
});
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static SCRIPT_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script\s[^>]*src\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static JSON_LD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});
static INVISIBLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<noscript[^>]*>.*?</noscript>|<!--.*?-->|<head[^>]*>.*?</head>")
        .expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex"));

impl PageContent {
    /// Parse raw HTML with tolerant pattern matching (no DOM)
    pub fn from_html(html: &str) -> Self {
        let title = TITLE_RE
            .captures(html)
            .map(|c| clean_text(&c[1]))
            .filter(|t| !t.is_empty());

        let mut meta = BTreeMap::new();
        for tag in META_RE.find_iter(html) {
            let mut key: Option<String> = None;
            let mut content: Option<String> = None;
            for attr in ATTR_RE.captures_iter(tag.as_str()) {
                let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str()).unwrap_or_default();
                match attr[1].to_lowercase().as_str() {
                    "name" | "property" | "itemprop" if key.is_none() => key = Some(value.to_lowercase()),
                    "content" => content = Some(decode_entities(value).trim().to_string()),
                    _ => {}
                }
            }
            if let (Some(key), Some(content)) = (key, content) {
                if !content.is_empty() {
                    meta.entry(key).or_insert(content);
                }
            }
        }

        let links = LINK_RE
            .captures_iter(html)
            .map(|c| decode_entities(c[1].trim()))
            .collect();
        let script_sources = SCRIPT_SRC_RE
            .captures_iter(html)
            .map(|c| c[1].trim().to_string())
            .collect();

        let mut structured_data = Vec::new();
        for block in JSON_LD_RE.captures_iter(html) {
            if let Ok(value) = serde_json::from_str::<Value>(block[1].trim()) {
                flatten_json_ld(value, &mut structured_data);
            }
        }

        let visible = INVISIBLE_RE.replace_all(html, " ");
        let text = clean_text(&TAG_RE.replace_all(&visible, " "));

        Self {
            title,
            meta,
            text,
            links,
            structured_data,
            script_sources,
        }
    }

    /// Non-whitespace characters of visible text
    pub fn visible_len(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }

    pub fn is_sufficient(&self, min_content_length: usize) -> bool {
        self.visible_len() >= min_content_length
    }

    fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// First JSON-LD node whose `@type` names an organization
    fn organization(&self) -> Option<&Value> {
        self.structured_data.iter().find(|node| {
            let types: Vec<&str> = match node.get("@type") {
                Some(Value::String(t)) => vec![t.as_str()],
                Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            types.iter().any(|t| {
                matches!(
                    *t,
                    "Organization" | "Corporation" | "LocalBusiness" | "OnlineBusiness" | "OnlineStore" | "NGO"
                ) || t.ends_with("Business")
            })
        })
    }
}

fn flatten_json_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_json_ld(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            if map.contains_key("@type") {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn clean_text(raw: &str) -> String {
    decode_entities(raw).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(raw: &str) -> String {
    ENTITY_RE
        .replace_all(raw, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity.to_lowercase().as_str() {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "ndash" => Some('–'),
                    "mdash" => Some('—'),
                    _ => None,
                }
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ============================================================================
// Candidate extraction
// ============================================================================

/// Confidence deductions from the tier's base confidence, by evidence kind
const STRUCTURED_PENALTY: u8 = 5;
const FIELD_PENALTY: u8 = 10;
const META_PENALTY: u8 = 20;
const TEXT_PENALTY: u8 = 25;
const INFERRED_PENALTY: u8 = 30;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,24}\b").expect("valid regex")
});
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)[\s.-]?)?\d{2,4}[\s.-]\d{3,4}[\s.-]?\d{3,4}\b").expect("valid regex")
});
static EMPLOYEE_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:,\d{3})+|\d+)\+?\s+(?:employees|staff|team members|people worldwide)")
        .expect("valid regex")
});
static EMPLOYEE_BAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:,\d{3})*\s*[-–]\s*\d{1,3}(?:,\d{3})*|\d{1,3}(?:,\d{3})*\+)\s+employees")
        .expect("valid regex")
});
static TITLE_SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-–—:·|]\s+|\|").expect("valid regex"));
static FOUNDED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:founded|established|since|est\.)\s+(?:in\s+)?((?:18|19|20)\d{2})\b").expect("valid regex")
});

/// Generic titles that never name an organization
pub(crate) const GENERIC_TITLES: &[&str] = &[
    "home", "homepage", "welcome", "index", "untitled", "loading", "loading...", "page not found",
    "404", "not found", "access denied", "just a moment...", "attention required!",
];

/// Extract field candidates from a page
///
/// `domain` is the page's own domain; it is used to prefer on-domain contact
/// addresses.
pub fn extract_candidates(page: &PageContent, source: SourceId, domain: Option<&str>) -> RawFields {
    let base = source.base_confidence();
    let conf = |penalty: u8| base.saturating_sub(penalty);
    let mut fields = RawFields::new();
    let org = page.organization();

    // name
    if let Some(name) = org.and_then(|o| json_str(o, "name")) {
        fields.offer(FieldName::Name, RawField::text(name, conf(STRUCTURED_PENALTY), source));
    }
    if let Some(name) = page.meta("og:site_name") {
        fields.offer(FieldName::Name, RawField::text(name, conf(STRUCTURED_PENALTY), source));
    }
    if let Some(name) = page.title.as_deref().and_then(name_from_title) {
        fields.offer(FieldName::Name, RawField::text(name, conf(TEXT_PENALTY), source));
    }

    // description
    if let Some(description) = org.and_then(|o| json_str(o, "description")) {
        fields.offer(FieldName::Description, RawField::text(description, conf(FIELD_PENALTY), source));
    }
    for key in ["description", "og:description"] {
        if let Some(description) = page.meta(key) {
            fields.offer(FieldName::Description, RawField::text(description, conf(META_PENALTY), source));
        }
    }

    // industry
    if let Some(industry) = org.and_then(|o| json_str(o, "industry")) {
        fields.offer(FieldName::Industry, RawField::text(industry, conf(FIELD_PENALTY), source));
    }
    let corpus = format!(
        "{} {} {}",
        page.title.as_deref().unwrap_or_default(),
        page.meta("description").unwrap_or_default(),
        page.text
    );
    if let Some(industry) = signals::infer_industry(&corpus) {
        fields.offer(FieldName::Industry, RawField::text(industry, conf(INFERRED_PENALTY), source));
    }

    // employee count and band
    if let Some(count) = org.and_then(|o| o.get("numberOfEmployees")).and_then(json_employee_count) {
        fields.offer(FieldName::EmployeeCount, RawField::integer(count, conf(FIELD_PENALTY), source));
        if let Some(band) = signals::band_for_count(count as u64) {
            fields.offer(FieldName::EmployeeCountRange, RawField::text(band, conf(FIELD_PENALTY), source));
        }
    }
    if let Some(band) = EMPLOYEE_BAND_RE
        .captures_iter(&page.text)
        .find_map(|c| signals::canonical_band(&c[1]))
    {
        fields.offer(FieldName::EmployeeCountRange, RawField::text(band, conf(META_PENALTY), source));
    }
    if let Some(count) = EMPLOYEE_COUNT_RE
        .captures_iter(&page.text)
        .filter(|c| !preceded_by_dash(&page.text, c.get(1).map(|m| m.start()).unwrap_or(0)))
        .find_map(|c| parse_grouped_number(&c[1]))
    {
        fields.offer(FieldName::EmployeeCount, RawField::integer(count, conf(INFERRED_PENALTY), source));
        if let Some(band) = signals::band_for_count(count as u64) {
            fields.offer(FieldName::EmployeeCountRange, RawField::text(band, conf(INFERRED_PENALTY), source));
        }
    }

    // founded year
    if let Some(year) = org
        .and_then(|o| json_str(o, "foundingDate"))
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<i64>().ok())
    {
        fields.offer(FieldName::FoundedYear, RawField::integer(year, conf(FIELD_PENALTY), source));
    }
    if let Some(year) = FOUNDED_RE
        .captures(&page.text)
        .and_then(|c| c[1].parse::<i64>().ok())
    {
        fields.offer(FieldName::FoundedYear, RawField::integer(year, conf(TEXT_PENALTY), source));
    }

    // location
    if let Some(location) = org.and_then(|o| o.get("address")).and_then(json_address) {
        fields.offer(FieldName::Location, RawField::text(location, conf(FIELD_PENALTY), source));
    }

    // email
    if let Some(email) = pick_email(page, domain) {
        fields.offer(FieldName::Email, RawField::text(email.value, conf(email.penalty), source));
    }

    // phone
    if let Some(phone) = org.and_then(|o| json_str(o, "telephone")) {
        fields.offer(FieldName::Phone, RawField::text(phone, conf(FIELD_PENALTY), source));
    }
    if let Some(phone) = page
        .links
        .iter()
        .find_map(|l| l.strip_prefix("tel:"))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
    {
        fields.offer(FieldName::Phone, RawField::text(phone, conf(FIELD_PENALTY), source));
    }
    if let Some(phone) = PHONE_RE.find(&page.text) {
        fields.offer(FieldName::Phone, RawField::text(phone.as_str().trim(), conf(TEXT_PENALTY), source));
    }

    // tech stack
    let generator = page.meta("generator").unwrap_or_default();
    let mut technologies = signals::detect_technologies(
        signals::PAGE_TECH_SIGNATURES,
        page.script_sources
            .iter()
            .map(String::as_str)
            .chain(page.links.iter().map(String::as_str))
            .chain(std::iter::once(generator)),
    );
    if generator.to_lowercase().starts_with("wordpress") && !technologies.iter().any(|t| t == "WordPress") {
        technologies.push("WordPress".to_string());
    }
    if !technologies.is_empty() {
        fields.offer(
            FieldName::TechStack,
            RawField::new(FieldData::List(technologies), conf(META_PENALTY), source),
        );
    }

    fields
}

struct EmailCandidate {
    value: String,
    penalty: u8,
}

fn pick_email(page: &PageContent, domain: Option<&str>) -> Option<EmailCandidate> {
    let on_domain = |email: &str| {
        domain
            .map(|d| email.to_lowercase().ends_with(&format!("@{}", d)))
            .unwrap_or(false)
    };

    let mailto: Vec<String> = page
        .links
        .iter()
        .filter_map(|l| l.strip_prefix("mailto:"))
        .map(|m| m.split('?').next().unwrap_or_default().trim().to_string())
        .filter(|m| m.contains('@'))
        .collect();
    let in_text: Vec<String> = EMAIL_RE
        .find_iter(&page.text)
        .map(|m| m.as_str().to_string())
        .collect();

    let choose = |emails: &[String]| {
        emails
            .iter()
            .find(|e| on_domain(e))
            .or_else(|| emails.first())
            .cloned()
    };

    if let Some(email) = choose(&mailto) {
        return Some(EmailCandidate {
            value: email,
            penalty: FIELD_PENALTY,
        });
    }
    choose(&in_text).map(|email| EmailCandidate {
        value: email,
        penalty: TEXT_PENALTY,
    })
}

/// Leading brand segment of a page title ("Acme | Widgets for everyone" → "Acme")
fn name_from_title(title: &str) -> Option<String> {
    let segment = TITLE_SEPARATOR_RE
        .split(title)
        .map(str::trim)
        .find(|s| !s.is_empty())?;
    if GENERIC_TITLES.contains(&segment.to_lowercase().as_str()) {
        return None;
    }
    Some(segment.to_string())
}

/// Upper bound of a range such as "51-200 employees"
fn preceded_by_dash(text: &str, start: usize) -> bool {
    text[..start]
        .trim_end()
        .chars()
        .next_back()
        .map(|c| c == '-' || c == '–')
        .unwrap_or(false)
}

fn json_str<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn json_employee_count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_grouped_number(s),
        Value::Object(map) => map.get("value").and_then(json_employee_count),
        _ => None,
    }
}

fn json_address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => {
            let parts: Vec<&str> = ["addressLocality", "addressRegion", "addressCountry"]
                .iter()
                .filter_map(|k| match map.get(*k) {
                    Some(Value::String(s)) => Some(s.trim()),
                    Some(Value::Object(country)) => country.get("name").and_then(Value::as_str).map(str::trim),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Array(items) => items.iter().find_map(json_address),
        _ => None,
    }
}

fn parse_grouped_number(raw: &str) -> Option<i64> {
    raw.replace(',', "").trim().parse().ok()
}
