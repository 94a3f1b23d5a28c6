//! `domain_registration` backup source (RDAP)
//!
//! The registration date is a founding-year signal (a company is at least as
//! old as its domain, usually about as old); the registrant organization, when
//! not redacted, is a name signal.

use super::{get_json, DirectLimiter, SourceAdapter, SourceError};
use crate::types::{EnrichmentRequest, FieldName, RawField, RawFields, SourceId};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use tracing::debug;

const RDAP_BOOTSTRAP_URL: &str = "https://rdap.org/domain";

pub const REGISTRATION_YEAR_CONFIDENCE: u8 = 55;
pub const REGISTRANT_NAME_CONFIDENCE: u8 = 60;

/// Registrant values that are privacy placeholders, not organizations
const REDACTION_MARKERS: &[&str] = &[
    "redacted", "privacy", "proxy", "protected", "withheld", "private", "not disclosed", "data protected",
];

pub struct RdapSource {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: DirectLimiter,
}

impl RdapSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, RDAP_BOOTSTRAP_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        // rdap.org asks clients to stay well under 10 requests per 10 seconds
        let quota = Quota::per_second(NonZeroU32::MIN);
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl SourceAdapter for RdapSource {
    fn id(&self) -> SourceId {
        SourceId::DomainRegistration
    }

    async fn lookup(&self, request: &EnrichmentRequest) -> Result<RawFields, SourceError> {
        let domain = request.target_domain().ok_or(SourceError::NotApplicable)?;

        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, domain);
        debug!(url, "RDAP lookup");
        let document = get_json(&self.client, &url).await?;

        let fields = parse_registration(&document, self.id());
        if fields.is_empty() {
            return Err(SourceError::NotFound);
        }
        Ok(fields)
    }
}

/// Field candidates from an RDAP domain object
pub fn parse_registration(document: &Value, source: SourceId) -> RawFields {
    let mut fields = RawFields::new();

    let registered_year = document
        .get("events")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|event| event.get("eventAction").and_then(Value::as_str) == Some("registration"))
        .and_then(|event| event.get("eventDate"))
        .and_then(Value::as_str)
        .and_then(|date| date.get(..4))
        .and_then(|year| year.parse::<i64>().ok());
    if let Some(year) = registered_year {
        fields.set(
            FieldName::FoundedYear,
            RawField::integer(year, REGISTRATION_YEAR_CONFIDENCE, source),
        );
    }

    if let Some(name) = registrant_organization(document) {
        fields.set(FieldName::Name, RawField::text(name, REGISTRANT_NAME_CONFIDENCE, source));
    }

    fields
}

fn registrant_organization(document: &Value) -> Option<String> {
    let registrant = document
        .get("entities")?
        .as_array()?
        .iter()
        .find(|entity| {
            entity
                .get("roles")
                .and_then(Value::as_array)
                .map(|roles| roles.iter().any(|r| r.as_str() == Some("registrant")))
                .unwrap_or(false)
        })?;

    // vcardArray: ["vcard", [[name, params, type, value], ...]]
    let properties = registrant.get("vcardArray")?.get(1)?.as_array()?;
    let value_of = |wanted: &str| {
        properties.iter().find_map(|prop| {
            let prop = prop.as_array()?;
            if prop.first()?.as_str()? != wanted {
                return None;
            }
            let value = prop.get(3)?;
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Array(parts) => parts.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "),
                _ => return None,
            };
            let text = text.trim().to_string();
            (!text.is_empty()).then_some(text)
        })
    };

    let name = value_of("org").or_else(|| value_of("fn"))?;
    let lower = name.to_lowercase();
    if REDACTION_MARKERS.iter().any(|marker| lower.contains(marker)) {
        debug!(registrant = %name, "Registrant is redacted");
        return None;
    }
    Some(name)
}
