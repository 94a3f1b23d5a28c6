//! `dns_records` backup source
//!
//! Confirms the domain exists and reads technology signals from its mail
//! exchangers and TXT verification records.

use super::{SourceAdapter, SourceError};
use crate::dns::{DnsClient, DnsError};
use crate::extract::signals::{detect_technologies, DNS_TECH_SIGNATURES};
use crate::types::{EnrichmentRequest, FieldData, FieldName, RawField, RawFields, SourceId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Tech signals from DNS are indirect evidence
const TECH_PENALTY: u8 = 20;

pub struct DnsRecordsSource {
    dns: Arc<dyn DnsClient>,
}

impl DnsRecordsSource {
    pub fn new(dns: Arc<dyn DnsClient>) -> Self {
        Self { dns }
    }
}

#[async_trait]
impl SourceAdapter for DnsRecordsSource {
    fn id(&self) -> SourceId {
        SourceId::DnsRecords
    }

    async fn lookup(&self, request: &EnrichmentRequest) -> Result<RawFields, SourceError> {
        let domain = request.target_domain().ok_or(SourceError::NotApplicable)?;
        let source = self.id();

        let addresses = self.dns.lookup_ip(&domain).await.map_err(|e| match e {
            DnsError::NotFound(_) => SourceError::NotFound,
            DnsError::Failed(message) => SourceError::Network(message),
        })?;
        if addresses.is_empty() {
            return Err(SourceError::NotFound);
        }

        let mut fields = RawFields::new();
        fields.set(
            FieldName::PrimaryDomain,
            RawField::text(domain.clone(), source.base_confidence(), source),
        );

        let mut records = self.dns.lookup_mx(&domain).await.unwrap_or_default();
        records.extend(self.dns.lookup_txt(&domain).await.unwrap_or_default());
        let technologies = detect_technologies(DNS_TECH_SIGNATURES, records.iter().map(String::as_str));
        debug!(domain = %domain, records = records.len(), technologies = ?technologies, "DNS records read");

        if !technologies.is_empty() {
            fields.set(
                FieldName::TechStack,
                RawField::new(
                    FieldData::List(technologies),
                    source.base_confidence().saturating_sub(TECH_PENALTY),
                    source,
                ),
            );
        }

        Ok(fields)
    }
}
