//! Validator / Confidence Scorer
//!
//! Verifies each candidate independently and assigns its final confidence:
//!
//! | Field           | Rule                                                |
//! |-----------------|-----------------------------------------------------|
//! | primaryDomain   | DNS + HTTP → 90, DNS only → 50, no DNS → discarded   |
//! | email           | shape + MX → 85, shape only → 50                     |
//! | phone           | regional numbering plan match → 70                   |
//! | everything else | plausibility check, keeps extraction confidence      |
//!
//! Cross-field consistency then penalizes contradicting fields, and the
//! discard threshold nulls whatever falls below it. A field is never
//! guessed: a candidate either survives with a score or becomes null.

pub mod phone;
pub mod probe;

pub use phone::Region;
pub use probe::{DomainProbe, NetworkProbe, ProbeMemo};

use crate::extract::signals;
use crate::extract::GENERIC_TITLES;
use crate::tiers::HostThrottle;
use crate::types::{
    normalize_domain, EnrichmentResult, FieldData, FieldName, FieldValue, LookupKey, RawField, RawFields,
};
use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

pub const DOMAIN_VERIFIED_CONFIDENCE: u8 = 90;
pub const DOMAIN_DNS_ONLY_CONFIDENCE: u8 = 50;
pub const EMAIL_WITH_MX_CONFIDENCE: u8 = 85;
pub const EMAIL_SHAPE_ONLY_CONFIDENCE: u8 = 50;
pub const PHONE_CONFIDENCE: u8 = 70;

/// Penalty for an employee count that contradicts the employee band
pub const HEADCOUNT_MISMATCH_PENALTY: u8 = 20;
/// Penalty for a corporate email on a different domain than the company's
pub const EMAIL_DOMAIN_MISMATCH_PENALTY: u8 = 10;

/// Raise applied when an independent source agrees with an existing candidate
pub const CORROBORATION_BOOST: u8 = 15;
/// Corroboration never lifts a candidate above this
pub const CORROBORATION_CAP: u8 = 95;

const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com", "googlemail.com", "yahoo.com", "hotmail.com", "outlook.com", "live.com", "msn.com",
    "aol.com", "icloud.com", "me.com", "protonmail.com", "proton.me", "gmx.com", "gmx.de", "web.de",
    "mail.com", "yandex.ru", "zoho.com", "qq.com", "163.com",
];

static EMAIL_SHAPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+-]+@((?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,24})$").expect("valid regex")
});

/// Per-resolution inputs the validator needs besides the candidates
pub struct ValidationContext {
    pub memo: ProbeMemo,
    pub deadline: Instant,
    pub now: DateTime<Utc>,
    /// Region for national phone numbers, from the caller's location hint
    pub region: Option<Region>,
}

impl ValidationContext {
    pub fn new(deadline: Instant, now: DateTime<Utc>, region: Option<Region>) -> Self {
        Self {
            memo: ProbeMemo::new(),
            deadline,
            now,
            region,
        }
    }

    /// Route HTTP checks through the shared per-host schedule
    pub fn with_throttle(mut self, throttle: HostThrottle) -> Self {
        self.memo = ProbeMemo::with_throttle(throttle);
        self
    }
}

pub struct Validator {
    probe: Arc<dyn DomainProbe>,
    discard_threshold: u8,
    acceptance_threshold: u8,
}

impl Validator {
    pub fn new(probe: Arc<dyn DomainProbe>, discard_threshold: u8, acceptance_threshold: u8) -> Self {
        Self {
            probe,
            discard_threshold,
            acceptance_threshold,
        }
    }

    pub fn discard_threshold(&self) -> u8 {
        self.discard_threshold
    }

    pub fn acceptance_threshold(&self) -> u8 {
        self.acceptance_threshold
    }

    /// Score every candidate and build the result for `key`
    pub async fn validate(&self, key: &LookupKey, raw: &RawFields, ctx: &mut ValidationContext) -> EnrichmentResult {
        let mut result = EnrichmentResult::unresolved(key.as_str(), ctx.now);

        // Domain first: email consistency depends on it
        let mut ordered: Vec<(&FieldName, &RawField)> = raw.iter().collect();
        ordered.sort_by_key(|(field, _)| **field != FieldName::PrimaryDomain);

        let region = ctx.region.or_else(|| {
            raw.get(FieldName::Location)
                .and_then(|c| c.value.as_text())
                .and_then(Region::from_location)
        });

        for (field, candidate) in ordered {
            match self.score(*field, candidate, ctx, region).await {
                Some((value, confidence)) => {
                    result.fields.insert(
                        *field,
                        FieldValue {
                            value: Some(value),
                            confidence,
                            source: Some(candidate.source),
                        },
                    );
                }
                None => debug!(key = %key, field = %field, source = %candidate.source, "Candidate rejected"),
            }
        }

        apply_consistency_penalties(&mut result);

        let discarded = result.enforce_discard_threshold(self.discard_threshold, self.acceptance_threshold);
        if !discarded.is_empty() {
            debug!(
                key = %key,
                discarded = ?discarded,
                threshold = self.discard_threshold,
                "Fields below discard threshold nulled"
            );
        }

        result
    }

    async fn score(
        &self,
        field: FieldName,
        candidate: &RawField,
        ctx: &mut ValidationContext,
        region: Option<Region>,
    ) -> Option<(FieldData, u8)> {
        let probe = self.probe.as_ref();
        match field {
            FieldName::PrimaryDomain => {
                let domain = normalize_domain(candidate.value.as_text()?)?;
                if !ctx.memo.resolves(probe, &domain, ctx.deadline).await {
                    return None;
                }
                let confidence = if ctx.memo.http_reachable(probe, &domain, ctx.deadline).await {
                    DOMAIN_VERIFIED_CONFIDENCE
                } else {
                    DOMAIN_DNS_ONLY_CONFIDENCE
                };
                Some((FieldData::Text(domain), confidence))
            }
            FieldName::Email => {
                let email = candidate.value.as_text()?.trim().to_lowercase();
                let host = EMAIL_SHAPE_RE.captures(&email)?.get(1)?.as_str().to_string();
                let confidence = if ctx.memo.has_mx(probe, &host, ctx.deadline).await {
                    EMAIL_WITH_MX_CONFIDENCE
                } else {
                    EMAIL_SHAPE_ONLY_CONFIDENCE
                };
                Some((FieldData::Text(email), confidence))
            }
            FieldName::Phone => {
                let phone = candidate.value.as_text()?.trim();
                phone::matches_numbering_plan(phone, region)
                    .then(|| (FieldData::Text(phone.to_string()), PHONE_CONFIDENCE))
            }
            _ => plausible(field, &candidate.value, ctx.now).map(|value| (value, candidate.confidence)),
        }
    }
}

/// Plausibility check for fields without a network probe; returns the cleaned value
fn plausible(field: FieldName, value: &FieldData, now: DateTime<Utc>) -> Option<FieldData> {
    match field {
        FieldName::Name => {
            let name = value.as_text()?.trim();
            let length = name.chars().count();
            let generic = GENERIC_TITLES.contains(&name.to_lowercase().as_str());
            ((2..=120).contains(&length) && name.chars().any(char::is_alphabetic) && !generic)
                .then(|| FieldData::Text(name.to_string()))
        }
        FieldName::Description => {
            let text = value.as_text()?.trim();
            (10..=2000)
                .contains(&text.chars().count())
                .then(|| FieldData::Text(text.to_string()))
        }
        FieldName::Industry => {
            let text = value.as_text()?.trim();
            (!text.is_empty() && text.chars().count() <= 80).then(|| FieldData::Text(text.to_string()))
        }
        FieldName::Location => {
            let text = value.as_text()?.trim();
            (2..=200)
                .contains(&text.chars().count())
                .then(|| FieldData::Text(text.to_string()))
        }
        FieldName::FoundedYear => {
            let year = value.as_integer()?;
            (1800..=i64::from(now.year())).contains(&year).then_some(FieldData::Integer(year))
        }
        FieldName::EmployeeCount => {
            let count = value.as_integer()?;
            (1..=5_000_000).contains(&count).then_some(FieldData::Integer(count))
        }
        FieldName::EmployeeCountRange => {
            signals::canonical_band(value.as_text()?).map(|band| FieldData::Text(band.to_string()))
        }
        FieldName::TechStack => {
            let mut items: Vec<String> = Vec::new();
            for item in value.as_list()? {
                let item = item.trim();
                if !item.is_empty() && !items.iter().any(|i| i.eq_ignore_ascii_case(item)) {
                    items.push(item.to_string());
                }
            }
            (!items.is_empty()).then_some(FieldData::List(items))
        }
        FieldName::PrimaryDomain | FieldName::Email | FieldName::Phone => None,
    }
}

fn penalize(result: &mut EnrichmentResult, field: FieldName, penalty: u8) {
    if let Some(value) = result.fields.get_mut(&field) {
        value.confidence = value.confidence.saturating_sub(penalty);
    }
}

fn apply_consistency_penalties(result: &mut EnrichmentResult) {
    let count = result.value(FieldName::EmployeeCount).and_then(FieldData::as_integer);
    let band = result
        .value(FieldName::EmployeeCountRange)
        .and_then(FieldData::as_text)
        .and_then(signals::band_bounds);
    if let (Some(count), Some((min, max))) = (count, band) {
        let count = count.max(0) as u64;
        if count < min / 2 || count > max.saturating_mul(2) {
            debug!(count, min, max, "Employee count contradicts band");
            penalize(result, FieldName::EmployeeCount, HEADCOUNT_MISMATCH_PENALTY);
            penalize(result, FieldName::EmployeeCountRange, HEADCOUNT_MISMATCH_PENALTY);
        }
    }

    let email_host = result
        .value(FieldName::Email)
        .and_then(FieldData::as_text)
        .and_then(|e| e.rsplit_once('@'))
        .map(|(_, host)| host.to_string());
    let domain = result
        .value(FieldName::PrimaryDomain)
        .and_then(FieldData::as_text)
        .map(str::to_string);
    if let (Some(host), Some(domain)) = (email_host, domain) {
        let same_org = host == domain || host.ends_with(&format!(".{}", domain));
        if !same_org && !FREE_MAIL_DOMAINS.contains(&host.as_str()) {
            debug!(email_host = %host, domain = %domain, "Email domain differs from primary domain");
            penalize(result, FieldName::Email, EMAIL_DOMAIN_MISMATCH_PENALTY);
        }
    }
}

/// Whether two sources report the same fact for `field`
pub fn corroborates(field: FieldName, existing: &FieldData, incoming: &FieldData) -> bool {
    match (existing, incoming) {
        (FieldData::Integer(a), FieldData::Integer(b)) => a == b,
        (FieldData::Text(a), FieldData::Text(b)) => match field {
            FieldName::Name => {
                let (a, b) = (comparable_name(a), comparable_name(b));
                !a.is_empty() && a == b
            }
            FieldName::PrimaryDomain => normalize_domain(a) == normalize_domain(b),
            FieldName::EmployeeCountRange => {
                signals::canonical_band(a).is_some() && signals::canonical_band(a) == signals::canonical_band(b)
            }
            _ => a.trim().eq_ignore_ascii_case(b.trim()),
        },
        (FieldData::List(a), FieldData::List(b)) => a
            .iter()
            .any(|x| b.iter().any(|y| x.eq_ignore_ascii_case(y))),
        _ => false,
    }
}

const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "llc", "ltd", "limited", "corp", "corporation", "co", "company", "gmbh", "ag",
    "sa", "sas", "bv", "plc", "pty", "srl", "oy", "ab",
];

/// Lower-cased name with punctuation and trailing legal suffixes removed
fn comparable_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    while words.len() > 1 && words.last().map(|w| LEGAL_SUFFIXES.contains(w)).unwrap_or(false) {
        words.pop();
    }
    words.join(" ")
}
