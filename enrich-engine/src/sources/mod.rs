//! Backup Source Waterfall
//!
//! Ordered low-cost providers consulted when scraping alone does not reach
//! the acceptance threshold. Each provider is a [`SourceAdapter`]; the
//! [`Waterfall`] holds them in fixed priority order, cheapest and most
//! reliable first:
//!
//! 1. `dns_records`: A/MX/TXT lookups
//! 2. `domain_registration`: RDAP
//! 3. `knowledge_graph`: Wikidata

pub mod dns_records;
pub mod rdap;
pub mod wikidata;

pub use dns_records::DnsRecordsSource;
pub use rdap::RdapSource;
pub use wikidata::WikidataSource;

use crate::dns::DnsClient;
use crate::types::{EnrichmentRequest, RawFields, SourceId};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::RateLimiter;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Provider quota shared by all lookups through one adapter
pub(crate) type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("source does not handle this kind of lookup key")]
    NotApplicable,

    #[error("no record found")]
    NotFound,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Parse(String),
}

/// A backup data provider
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> SourceId;

    /// Partial field candidates for the request's entity
    async fn lookup(&self, request: &EnrichmentRequest) -> Result<RawFields, SourceError>;
}

/// Backup sources in priority order
#[derive(Clone, Default)]
pub struct Waterfall {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl Waterfall {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// DNS records → domain registration → knowledge graph
    pub fn standard(client: reqwest::Client, dns: Arc<dyn DnsClient>) -> Self {
        Self::new(vec![
            Arc::new(DnsRecordsSource::new(dns)),
            Arc::new(RdapSource::new(client.clone())),
            Arc::new(WikidataSource::new(client)),
        ])
    }

    /// Adapter following `after` (`None` = first); `None` when exhausted
    pub fn next_source(&self, after: Option<SourceId>) -> Option<Arc<dyn SourceAdapter>> {
        let index = match after {
            None => 0,
            Some(id) => self.adapters.iter().position(|a| a.id() == id)? + 1,
        };
        self.adapters.get(index).cloned()
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// GET a JSON document; 404 maps to [`SourceError::NotFound`]
pub(crate) async fn get_json(client: &reqwest::Client, url: &str) -> Result<Value, SourceError> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json, application/rdap+json")
        .send()
        .await
        .map_err(|e| SourceError::Network(e.to_string()))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound);
    }
    if !status.is_success() {
        return Err(SourceError::Network(format!("provider returned {}", status)));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| SourceError::Parse(e.to_string()))
}
