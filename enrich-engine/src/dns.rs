//! DNS lookups (A/AAAA, MX, TXT) shared by the validator probes and the
//! `dns_records` backup source

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    /// Authoritative "no such name / no such record"
    #[error("no records for {0}")]
    NotFound(String),

    #[error("DNS lookup failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait DnsClient: Send + Sync {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, DnsError>;

    /// Mail exchangers, most preferred first, without trailing dots
    async fn lookup_mx(&self, host: &str) -> Result<Vec<String>, DnsError>;

    async fn lookup_txt(&self, host: &str) -> Result<Vec<String>, DnsError>;
}

/// System-default resolver (hickory)
pub struct HickoryDns {
    resolver: TokioAsyncResolver,
}

impl HickoryDns {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for HickoryDns {
    fn default() -> Self {
        Self::new()
    }
}

fn map_error(host: &str, err: ResolveError) -> DnsError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => DnsError::NotFound(host.to_string()),
        _ => DnsError::Failed(err.to_string()),
    }
}

#[async_trait]
impl DnsClient for HickoryDns {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| map_error(host, e))?;
        Ok(lookup.iter().collect())
    }

    async fn lookup_mx(&self, host: &str) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .mx_lookup(host)
            .await
            .map_err(|e| map_error(host, e))?;
        let mut records: Vec<(u16, String)> = lookup
            .iter()
            .map(|mx| {
                let exchange = mx.exchange().to_utf8();
                (mx.preference(), exchange.trim_end_matches('.').to_lowercase())
            })
            .collect();
        records.sort();
        Ok(records.into_iter().map(|(_, exchange)| exchange).collect())
    }

    async fn lookup_txt(&self, host: &str) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .txt_lookup(host)
            .await
            .map_err(|e| map_error(host, e))?;
        Ok(lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<String>()
            })
            .collect())
    }
}
