//! `knowledge_graph` backup source (Wikidata)
//!
//! Entity search, then claims from the best matching item:
//! P856 official website, P571 inception, P1128 employees, P452 industry.
//!
//! For domain keys an item is only accepted when its official website is on
//! the same domain. For name keys the item label must match the name; such
//! matches are weaker evidence and score lower.

use super::{get_json, DirectLimiter, SourceAdapter, SourceError};
use crate::extract::signals::band_for_count;
use crate::types::{
    normalize_domain, EnrichmentRequest, FieldData, FieldName, KeyKind, RawField, RawFields, SourceId,
};
use crate::validate::corroborates;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use tracing::debug;

const WIKIDATA_API_URL: &str = "https://www.wikidata.org/w/api.php";
const WIKIDATA_ENTITY_URL: &str = "https://www.wikidata.org/wiki/Special:EntityData";

/// Search hits examined per lookup
const MAX_CANDIDATES: usize = 3;

/// Confidence for values from an item whose website matches the domain
pub const VERIFIED_CONFIDENCE: u8 = 80;
/// Confidence for values from an item matched by label only
pub const NAME_MATCH_CONFIDENCE: u8 = 65;

pub struct WikidataSource {
    client: reqwest::Client,
    api_url: String,
    entity_url: String,
    rate_limiter: DirectLimiter,
}

/// Facts read from one Wikidata item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WikidataEntity {
    pub id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub inception_year: Option<i64>,
    pub employees: Option<i64>,
    pub industry_id: Option<String>,
}

impl WikidataSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_urls(client, WIKIDATA_API_URL, WIKIDATA_ENTITY_URL)
    }

    pub fn with_urls(client: reqwest::Client, api_url: impl Into<String>, entity_url: impl Into<String>) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN));
        Self {
            client,
            api_url: api_url.into(),
            entity_url: entity_url.into().trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(quota),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, SourceError> {
        self.rate_limiter.until_ready().await;
        let url = reqwest::Url::parse_with_params(
            &self.api_url,
            &[
                ("action", "wbsearchentities"),
                ("search", query),
                ("language", "en"),
                ("type", "item"),
                ("limit", "5"),
                ("format", "json"),
            ],
        )
        .map_err(|e| SourceError::Parse(e.to_string()))?;

        let document = get_json(&self.client, url.as_str()).await?;
        Ok(document
            .get("search")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|hit| hit.get("id").and_then(Value::as_str).map(str::to_string))
            .take(MAX_CANDIDATES)
            .collect())
    }

    async fn entity(&self, id: &str) -> Result<WikidataEntity, SourceError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/{}.json", self.entity_url, id);
        let document = get_json(&self.client, &url).await?;
        parse_entity(&document, id).ok_or_else(|| SourceError::Parse(format!("entity {} missing", id)))
    }

    async fn label(&self, id: &str) -> Option<String> {
        self.rate_limiter.until_ready().await;
        let url = reqwest::Url::parse_with_params(
            &self.api_url,
            &[
                ("action", "wbgetentities"),
                ("ids", id),
                ("props", "labels"),
                ("languages", "en"),
                ("format", "json"),
            ],
        )
        .ok()?;
        let document = get_json(&self.client, url.as_str()).await.ok()?;
        document
            .get("entities")?
            .get(id)?
            .get("labels")?
            .get("en")?
            .get("value")?
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl SourceAdapter for WikidataSource {
    fn id(&self) -> SourceId {
        SourceId::KnowledgeGraph
    }

    async fn lookup(&self, request: &EnrichmentRequest) -> Result<RawFields, SourceError> {
        let domain = request.target_domain();
        let query = match (request.key.kind(), domain.as_deref()) {
            (KeyKind::Name, _) => request.key.as_str().to_string(),
            (KeyKind::Domain, Some(domain)) => search_term_for_domain(domain),
            (KeyKind::Domain, None) => return Err(SourceError::NotApplicable),
        };

        for id in self.search(&query).await? {
            let entity = match self.entity(&id).await {
                Ok(entity) => entity,
                Err(e) => {
                    debug!(id, error = %e, "Skipping Wikidata item");
                    continue;
                }
            };

            let confidence = match entity_match(&entity, request.key.kind(), request.key.as_str(), domain.as_deref()) {
                Some(confidence) => confidence,
                None => continue,
            };

            let industry = match &entity.industry_id {
                Some(industry_id) => self.label(industry_id).await,
                None => None,
            };
            debug!(id, confidence, "Wikidata item matched");
            return Ok(entity_fields(&entity, industry, confidence, self.id()));
        }

        Err(SourceError::NotFound)
    }
}

/// Search text for a domain: its registrable label ("acme-widgets.co.uk" → "acme widgets")
fn search_term_for_domain(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    let label = if labels.len() >= 3 && labels[labels.len() - 2].len() <= 3 {
        labels[labels.len() - 3]
    } else if labels.len() >= 2 {
        labels[labels.len() - 2]
    } else {
        domain
    };
    label.replace('-', " ")
}

/// Confidence to assign an item's facts, or `None` if it is not the entity
fn entity_match(entity: &WikidataEntity, kind: KeyKind, key: &str, domain: Option<&str>) -> Option<u8> {
    let website_domain = entity.website.as_deref().and_then(normalize_domain);
    if let (Some(domain), Some(website)) = (domain, website_domain.as_deref()) {
        if website == domain || website.ends_with(&format!(".{}", domain)) {
            return Some(VERIFIED_CONFIDENCE);
        }
    }
    match kind {
        KeyKind::Domain => None,
        KeyKind::Name => {
            let label = entity.label.as_deref()?;
            let label = FieldData::Text(label.to_string());
            let key = FieldData::Text(key.to_string());
            corroborates(FieldName::Name, &label, &key).then_some(NAME_MATCH_CONFIDENCE)
        }
    }
}

fn entity_fields(entity: &WikidataEntity, industry: Option<String>, confidence: u8, source: SourceId) -> RawFields {
    let mut fields = RawFields::new();
    if let Some(label) = &entity.label {
        fields.set(FieldName::Name, RawField::text(label.clone(), confidence, source));
    }
    if let Some(description) = &entity.description {
        fields.set(FieldName::Description, RawField::text(description.clone(), confidence.saturating_sub(10), source));
    }
    if let Some(domain) = entity.website.as_deref().and_then(normalize_domain) {
        fields.set(FieldName::PrimaryDomain, RawField::text(domain, confidence, source));
    }
    if let Some(year) = entity.inception_year {
        fields.set(FieldName::FoundedYear, RawField::integer(year, confidence.saturating_sub(5), source));
    }
    if let Some(employees) = entity.employees {
        fields.set(FieldName::EmployeeCount, RawField::integer(employees, confidence.saturating_sub(10), source));
        if let Some(band) = band_for_count(employees.max(0) as u64) {
            fields.set(FieldName::EmployeeCountRange, RawField::text(band, confidence.saturating_sub(10), source));
        }
    }
    if let Some(industry) = industry {
        fields.set(FieldName::Industry, RawField::text(industry, confidence.saturating_sub(10), source));
    }
    fields
}

/// Read an item from a `Special:EntityData/{id}.json` document
pub fn parse_entity(document: &Value, id: &str) -> Option<WikidataEntity> {
    let entity = document.get("entities")?.get(id)?;
    let claims = entity.get("claims");
    let claim = |property: &str| -> Option<&Value> {
        claims?
            .get(property)?
            .as_array()?
            .iter()
            .find(|c| c.get("rank").and_then(Value::as_str) != Some("deprecated"))?
            .get("mainsnak")?
            .get("datavalue")?
            .get("value")
    };

    Some(WikidataEntity {
        id: id.to_string(),
        label: entity
            .get("labels")
            .and_then(|l| l.get("en"))
            .and_then(|l| l.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string),
        description: entity
            .get("descriptions")
            .and_then(|d| d.get("en"))
            .and_then(|d| d.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string),
        website: claim("P856").and_then(Value::as_str).map(str::to_string),
        // "+1998-09-04T00:00:00Z"
        inception_year: claim("P571")
            .and_then(|v| v.get("time"))
            .and_then(Value::as_str)
            .and_then(|t| t.trim_start_matches('+').get(..4))
            .and_then(|y| y.parse().ok()),
        // "+190234"
        employees: claim("P1128")
            .and_then(|v| v.get("amount"))
            .and_then(Value::as_str)
            .and_then(|a| a.trim_start_matches('+').split('.').next())
            .and_then(|a| a.parse().ok()),
        industry_id: claim("P452")
            .and_then(|v| v.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
