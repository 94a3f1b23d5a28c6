//! Core data contracts for the resolution engine
//!
//! These types flow between the tiers:
//! - **Scraping tiers / backup sources** produce [`RawFields`] (unverified candidates)
//! - **Validator** turns candidates into an [`EnrichmentResult`]
//! - **Orchestrator** caches the result and records a [`CostLogEntry`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Sources
// ============================================================================

/// Identifies which tier or provider produced a value (attribution trail)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Cache,
    Input,
    Fetch,
    Render,
    DnsRecords,
    DomainRegistration,
    KnowledgeGraph,
}

impl SourceId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Input => "input",
            Self::Fetch => "fetch",
            Self::Render => "render",
            Self::DnsRecords => "dns_records",
            Self::DomainRegistration => "domain_registration",
            Self::KnowledgeGraph => "knowledge_graph",
        }
    }

    /// Estimated cost of one call to this source, in dollars
    pub fn estimated_cost(self) -> f64 {
        match self {
            Self::Cache => 0.0,
            Self::Input => 0.0,
            Self::Fetch => 0.001,
            Self::Render => 0.01,
            Self::DnsRecords => 0.0001,
            Self::DomainRegistration => 0.0005,
            Self::KnowledgeGraph => 0.0005,
        }
    }

    /// Baseline extraction confidence (0-100) for values from this source
    pub fn base_confidence(self) -> u8 {
        match self {
            Self::Cache => 100,
            Self::Input => 60,
            Self::Fetch => 90,
            Self::Render => 80,
            Self::DnsRecords => 80,
            Self::DomainRegistration => 60,
            Self::KnowledgeGraph => 80,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache" => Ok(Self::Cache),
            "input" => Ok(Self::Input),
            "fetch" => Ok(Self::Fetch),
            "render" => Ok(Self::Render),
            "dns_records" => Ok(Self::DnsRecords),
            "domain_registration" => Ok(Self::DomainRegistration),
            "knowledge_graph" => Ok(Self::KnowledgeGraph),
            other => Err(format!("unknown source id: {}", other)),
        }
    }
}

// ============================================================================
// Fields
// ============================================================================

/// Fields an enrichment result can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    Name,
    PrimaryDomain,
    Description,
    Industry,
    EmployeeCount,
    EmployeeCountRange,
    FoundedYear,
    Location,
    Email,
    Phone,
    TechStack,
}

impl FieldName {
    pub const ALL: [FieldName; 11] = [
        FieldName::Name,
        FieldName::PrimaryDomain,
        FieldName::Description,
        FieldName::Industry,
        FieldName::EmployeeCount,
        FieldName::EmployeeCountRange,
        FieldName::FoundedYear,
        FieldName::Location,
        FieldName::Email,
        FieldName::Phone,
        FieldName::TechStack,
    ];

    /// Importance weight used for the overall confidence mean
    pub fn weight(self) -> u32 {
        match self {
            Self::Name | Self::PrimaryDomain => 3,
            Self::Industry | Self::EmployeeCountRange | Self::Email => 2,
            Self::Description
            | Self::EmployeeCount
            | Self::FoundedYear
            | Self::Location
            | Self::Phone
            | Self::TechStack => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::PrimaryDomain => "primaryDomain",
            Self::Description => "description",
            Self::Industry => "industry",
            Self::EmployeeCount => "employeeCount",
            Self::EmployeeCountRange => "employeeCountRange",
            Self::FoundedYear => "foundedYear",
            Self::Location => "location",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::TechStack => "techStack",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed field payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldData {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl FieldData {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

/// A validated field: value (or null), confidence 0-100, and where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: Option<FieldData>,
    pub confidence: u8,
    pub source: Option<SourceId>,
}

impl FieldValue {
    pub fn empty() -> Self {
        Self {
            value: None,
            confidence: 0,
            source: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Unverified candidate value produced by a tier or backup source
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub value: FieldData,
    pub confidence: u8,
    pub source: SourceId,
}

impl RawField {
    pub fn new(value: FieldData, confidence: u8, source: SourceId) -> Self {
        Self {
            value,
            confidence: confidence.min(100),
            source,
        }
    }

    pub fn text(value: impl Into<String>, confidence: u8, source: SourceId) -> Self {
        Self::new(FieldData::Text(value.into()), confidence, source)
    }

    pub fn integer(value: i64, confidence: u8, source: SourceId) -> Self {
        Self::new(FieldData::Integer(value), confidence, source)
    }
}

/// Candidate values keyed by field, before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    fields: BTreeMap<FieldName, RawField>,
}

impl RawFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: FieldName) -> Option<&RawField> {
        self.fields.get(&field)
    }

    pub fn get_mut(&mut self, field: FieldName) -> Option<&mut RawField> {
        self.fields.get_mut(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &RawField)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Unconditionally set a candidate
    pub fn set(&mut self, field: FieldName, candidate: RawField) {
        self.fields.insert(field, candidate);
    }

    /// Keep the higher-confidence candidate for a field
    pub fn offer(&mut self, field: FieldName, candidate: RawField) {
        match self.fields.get(&field) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                self.fields.insert(field, candidate);
            }
        }
    }

    /// Merge another candidate set, keeping the higher-confidence candidate per field
    pub fn absorb(&mut self, other: RawFields) {
        for (field, candidate) in other.fields {
            self.offer(field, candidate);
        }
    }

    /// Merge a backup source's candidates into fields that did not survive validation
    ///
    /// Fields holding a validated (non-null) value in `current` are never touched.
    /// Returns the fields that were filled.
    pub fn fill_unresolved(&mut self, other: RawFields, current: &EnrichmentResult) -> Vec<FieldName> {
        let mut filled = Vec::new();
        for (field, candidate) in other.fields {
            let resolved = current
                .fields
                .get(&field)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if resolved {
                continue;
            }
            self.fields.insert(field, candidate);
            filled.push(field);
        }
        filled
    }
}

impl FromIterator<(FieldName, RawField)> for RawFields {
    fn from_iter<I: IntoIterator<Item = (FieldName, RawField)>>(iter: I) -> Self {
        let mut fields = RawFields::new();
        for (field, candidate) in iter {
            fields.offer(field, candidate);
        }
        fields
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Whether a lookup key names a domain or a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Domain,
    Name,
}

/// Identifier rejected before resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier: {0}")]
pub struct InvalidIdentifier(pub String);

/// Normalized identifier used as cache and ledger key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupKey {
    kind: KeyKind,
    value: String,
}

impl LookupKey {
    /// Normalize a caller-supplied identifier
    ///
    /// Strips scheme, `www.`, path, query, port and trailing dot. Anything that
    /// then looks like a hostname becomes a domain key; everything else is a
    /// whitespace-collapsed, lower-cased name key.
    pub fn parse(identifier: &str) -> Result<Self, InvalidIdentifier> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(InvalidIdentifier("identifier is empty".to_string()));
        }

        if let Some(domain) = normalize_domain(trimmed) {
            return Ok(Self {
                kind: KeyKind::Domain,
                value: domain,
            });
        }

        let name = trimmed
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Ok(Self {
            kind: KeyKind::Name,
            value: name,
        })
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> Option<&str> {
        match self.kind {
            KeyKind::Domain => Some(&self.value),
            KeyKind::Name => None,
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Reduce a URL-ish string to a bare lower-case hostname, if it is one
pub fn normalize_domain(input: &str) -> Option<String> {
    let mut s = input.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest.to_string();
        }
    }
    let host = s
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    if is_hostname(host) {
        Some(host.to_string())
    } else {
        None
    }
}

fn is_hostname(host: &str) -> bool {
    if host.len() > 253 || !host.contains('.') {
        return false;
    }
    let labels: Vec<&str> = host.split('.').collect();
    let tld = labels.last().copied().unwrap_or_default();
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Optional caller knowledge about the entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHints {
    pub known_domain: Option<String>,
    pub known_location: Option<String>,
}

/// One resolution request; immutable once created
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub request_id: Uuid,
    pub key: LookupKey,
    pub hints: RequestHints,
    pub requested_at: DateTime<Utc>,
}

impl EnrichmentRequest {
    pub fn new(key: LookupKey, hints: RequestHints, requested_at: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            key,
            hints,
            requested_at,
        }
    }

    /// Domain to scrape: the key itself for domain keys, else the hinted domain
    pub fn target_domain(&self) -> Option<String> {
        self.key
            .domain()
            .map(str::to_string)
            .or_else(|| self.hints.known_domain.as_deref().and_then(normalize_domain))
    }
}

// ============================================================================
// Results
// ============================================================================

/// Final resolution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    PartiallyResolved,
    Unresolved,
}

impl ResolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::PartiallyResolved => "partially_resolved",
            Self::Unresolved => "unresolved",
        }
    }
}

impl FromStr for ResolutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolved" => Ok(Self::Resolved),
            "partially_resolved" => Ok(Self::PartiallyResolved),
            "unresolved" => Ok(Self::Unresolved),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Structured, confidence-scored record for one lookup key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub lookup_key: String,
    pub fields: BTreeMap<FieldName, FieldValue>,
    pub overall_confidence: u8,
    pub resolved_at: DateTime<Utc>,
    pub sources: Vec<SourceId>,
    pub status: ResolutionStatus,
}

impl EnrichmentResult {
    /// "No data available": every field null, confidence 0
    pub fn unresolved(lookup_key: impl Into<String>, resolved_at: DateTime<Utc>) -> Self {
        Self {
            lookup_key: lookup_key.into(),
            fields: FieldName::ALL
                .iter()
                .map(|f| (*f, FieldValue::empty()))
                .collect(),
            overall_confidence: 0,
            resolved_at,
            sources: Vec::new(),
            status: ResolutionStatus::Unresolved,
        }
    }

    pub fn field(&self, field: FieldName) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn value(&self, field: FieldName) -> Option<&FieldData> {
        self.fields.get(&field).and_then(|v| v.value.as_ref())
    }

    pub fn confidence(&self, field: FieldName) -> u8 {
        self.fields.get(&field).map(|v| v.confidence).unwrap_or(0)
    }

    pub fn non_null_count(&self) -> usize {
        self.fields.values().filter(|v| !v.is_null()).count()
    }

    /// Null every field below `threshold` and recompute aggregates
    ///
    /// Returns the fields that were discarded.
    pub fn enforce_discard_threshold(&mut self, threshold: u8, acceptance: u8) -> Vec<FieldName> {
        let mut discarded = Vec::new();
        for (field, value) in self.fields.iter_mut() {
            if value.value.is_some() && value.confidence < threshold {
                value.value = None;
                value.confidence = 0;
                discarded.push(*field);
            }
        }
        self.recompute(acceptance);
        discarded
    }

    /// Recompute overall confidence, attribution trail and status from the fields
    pub fn recompute(&mut self, acceptance: u8) {
        let mut weighted_sum: u32 = 0;
        let mut weight_total: u32 = 0;
        let mut sources: Vec<SourceId> = Vec::new();

        for (field, value) in &self.fields {
            if value.value.is_none() {
                continue;
            }
            weighted_sum += u32::from(value.confidence) * field.weight();
            weight_total += field.weight();
            if let Some(source) = value.source {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }

        sources.sort();
        self.sources = sources;
        self.overall_confidence = if weight_total == 0 {
            0
        } else {
            (weighted_sum / weight_total) as u8
        };
        self.status = if weight_total == 0 {
            ResolutionStatus::Unresolved
        } else if self.overall_confidence >= acceptance {
            ResolutionStatus::Resolved
        } else {
            ResolutionStatus::PartiallyResolved
        };
    }

    /// Source of the highest-weighted surviving field (ties broken by confidence)
    ///
    /// Values echoed from the caller's own input only count when nothing
    /// else survived.
    pub fn primary_source(&self) -> Option<SourceId> {
        let best = |include_input: bool| {
            self.fields
                .iter()
                .filter(|(_, v)| v.value.is_some())
                .filter(|(_, v)| include_input || v.source != Some(SourceId::Input))
                .max_by_key(|(f, v)| (f.weight() * u32::from(v.confidence), std::cmp::Reverse(**f)))
                .and_then(|(_, v)| v.source)
        };
        best(false).or_else(|| best(true))
    }
}

// ============================================================================
// Attempts and ledger entries
// ============================================================================

/// Outcome of one call to one tier/source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
}

/// Ephemeral record of one tier/source call within a single resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub source: SourceId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    pub retry_count: u32,
}

/// One append-only ledger row per completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLogEntry {
    pub request_key: String,
    pub cache_hit: bool,
    pub sources_used: Vec<SourceId>,
    pub satisfied_by: Option<SourceId>,
    pub estimated_cost: f64,
    pub final_confidence: u8,
    pub status: ResolutionStatus,
    pub attempt_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl CostLogEntry {
    /// Summarize a completed resolution
    pub fn from_attempts(
        request_key: &str,
        result: &EnrichmentResult,
        attempts: &[SourceAttempt],
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut sources_used: Vec<SourceId> = Vec::new();
        for attempt in attempts {
            if !sources_used.contains(&attempt.source) {
                sources_used.push(attempt.source);
            }
        }
        let estimated_cost = attempts.iter().map(|a| a.source.estimated_cost()).sum();

        Self {
            request_key: request_key.to_string(),
            cache_hit: false,
            sources_used,
            satisfied_by: result.primary_source(),
            estimated_cost,
            final_confidence: result.overall_confidence,
            status: result.status,
            attempt_count: attempts.len() as u32,
            timestamp,
        }
    }

    /// Ledger row for a request answered from cache
    pub fn cache_hit(request_key: &str, result: &EnrichmentResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            request_key: request_key.to_string(),
            cache_hit: true,
            sources_used: vec![SourceId::Cache],
            satisfied_by: Some(SourceId::Cache),
            estimated_cost: SourceId::Cache.estimated_cost(),
            final_confidence: result.overall_confidence,
            status: result.status,
            attempt_count: 0,
            timestamp,
        }
    }
}
