//! Resolution Orchestrator
//!
//! Drives one lookup key through the resolution state machine:
//!
//! ```text
//! CacheCheck → Scraping → Validating → BackupWaterfall → Finalizing → Done
//!     │                        │                              ▲
//!     └── hit ──→ Done         └──── ≥ acceptance ────────────┘
//! ```
//!
//! Each state is handled by a `phase_*` method in its own module. A single
//! resolution is strictly sequential; concurrency across keys belongs to the
//! batch coordinator. Tier and adapter failures never escape `resolve`: every
//! request ends in a well-formed [`EnrichmentResult`], possibly `Unresolved`.
//!
//! A hard per-request deadline bounds every tier call, backoff sleep and
//! probe. Hitting it forces the machine forward with whatever data exists.

mod phase_backup;
mod phase_finalizing;
mod phase_scraping;
mod phase_validating;

use crate::cache::{CacheStore, MemoryCache};
use crate::config::{EngineConfig, MAX_REQUEST_TIMEOUT_SECS};
use crate::dns::{DnsClient, HickoryDns};
use crate::error::EngineError;
use crate::ledger::{CostLedger, LedgerHandle, MemoryLedger};
use crate::sources::Waterfall;
use crate::tiers::{build_http_client, BrowserRenderer, DisabledRenderer, Fetcher, HostThrottle, HttpFetcher, Renderer};
use crate::types::{
    AttemptOutcome, CostLogEntry, EnrichmentRequest, EnrichmentResult, LookupKey, RawFields, RequestHints,
    SourceAttempt, SourceId,
};
use crate::validate::{DomainProbe, NetworkProbe, Region, ValidationContext, Validator};
use chrono::{DateTime, Utc};
use enrich_common::{Clock, SystemClock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Resolution state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    CacheCheck,
    Scraping,
    Validating,
    BackupWaterfall,
    Finalizing,
    Done,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CacheCheck => "CACHE_CHECK",
            Self::Scraping => "SCRAPING",
            Self::Validating => "VALIDATING",
            Self::BackupWaterfall => "BACKUP_WATERFALL",
            Self::Finalizing => "FINALIZING",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Working state of one in-flight resolution
pub(crate) struct Resolution {
    request: EnrichmentRequest,
    raw: RawFields,
    current: EnrichmentResult,
    attempts: Vec<SourceAttempt>,
    ctx: ValidationContext,
}

impl Resolution {
    fn new(request: EnrichmentRequest, deadline: Instant, now: DateTime<Utc>, throttle: HostThrottle) -> Self {
        let region = request.hints.known_location.as_deref().and_then(Region::from_location);
        Self {
            current: EnrichmentResult::unresolved(request.key.as_str(), now),
            ctx: ValidationContext::new(deadline, now, region).with_throttle(throttle),
            request,
            raw: RawFields::new(),
            attempts: Vec::new(),
        }
    }

    fn key(&self) -> &str {
        self.request.key.as_str()
    }

    fn deadline(&self) -> Instant {
        self.ctx.deadline
    }

    fn deadline_passed(&self) -> bool {
        Instant::now() >= self.ctx.deadline
    }

    fn record_attempt(
        &mut self,
        source: SourceId,
        started_at: DateTime<Utc>,
        started: Instant,
        outcome: AttemptOutcome,
        retry_count: u32,
    ) {
        self.attempts.push(SourceAttempt {
            source,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
            retry_count,
        });
    }
}

/// Sequences cache, scraping tiers, validation and backup sources for one key
#[derive(Clone)]
pub struct Orchestrator {
    config: EngineConfig,
    cache: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    renderer: Arc<dyn Renderer>,
    waterfall: Waterfall,
    probe: Arc<dyn DomainProbe>,
    validator: Arc<Validator>,
    throttle: HostThrottle,
    ledger: LedgerHandle,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn builder(config: EngineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }

    pub fn throttle(&self) -> &HostThrottle {
        &self.throttle
    }

    pub fn waterfall(&self) -> &Waterfall {
        &self.waterfall
    }

    pub fn render_enabled(&self) -> bool {
        self.renderer.is_enabled()
    }

    /// Same collaborators under a different policy
    ///
    /// Cache, ledger and host throttle stay shared with `self`.
    pub fn with_config(&self, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let validator = Validator::new(
            self.probe.clone(),
            config.discard_threshold,
            config.acceptance_threshold,
        );
        Ok(Self {
            config,
            validator: Arc::new(validator),
            ..self.clone()
        })
    }

    /// Resolve a caller-supplied identifier
    ///
    /// Only an empty identifier is an error; every other failure yields a
    /// well-formed (possibly unresolved) result.
    pub async fn resolve(&self, identifier: &str) -> Result<EnrichmentResult, EngineError> {
        self.resolve_with_hints(identifier, RequestHints::default()).await
    }

    pub async fn resolve_with_hints(
        &self,
        identifier: &str,
        hints: RequestHints,
    ) -> Result<EnrichmentResult, EngineError> {
        let key = LookupKey::parse(identifier)?;
        let request = EnrichmentRequest::new(key, hints, self.clock.now());
        Ok(self.resolve_request(request).await)
    }

    /// Run the state machine for one request
    pub async fn resolve_request(&self, request: EnrichmentRequest) -> EnrichmentResult {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.config.request_timeout())
            .unwrap_or_else(|| started + Duration::from_secs(MAX_REQUEST_TIMEOUT_SECS));
        let mut run = Resolution::new(request, deadline, self.clock.now(), self.throttle.clone());

        info!(
            request_id = %run.request.request_id,
            key = %run.request.key,
            kind = ?run.request.key.kind(),
            "Resolution started"
        );

        let mut state = ResolutionState::CacheCheck;
        while state != ResolutionState::Done {
            let next = match state {
                ResolutionState::CacheCheck => self.phase_cache_check(&mut run).await,
                ResolutionState::Scraping => self.phase_scraping(&mut run).await,
                ResolutionState::Validating => self.phase_validating(&mut run).await,
                ResolutionState::BackupWaterfall => self.phase_backup(&mut run).await,
                ResolutionState::Finalizing => self.phase_finalizing(&mut run).await,
                ResolutionState::Done => ResolutionState::Done,
            };
            debug!(key = %run.request.key, from = %state, to = %next, "State transition");
            state = next;
        }

        info!(
            request_id = %run.request.request_id,
            key = %run.request.key,
            status = run.current.status.as_str(),
            confidence = run.current.overall_confidence,
            attempts = run.attempts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Resolution finished"
        );

        run.current
    }

    /// CacheCheck: a live entry ends the resolution with zero source calls
    async fn phase_cache_check(&self, run: &mut Resolution) -> ResolutionState {
        match self.cache.get(run.key()).await {
            Some(entry) => {
                info!(
                    key = %run.request.key,
                    status = entry.result.status.as_str(),
                    expires_at = %entry.expires_at,
                    "Cache hit"
                );
                self.ledger
                    .record(CostLogEntry::cache_hit(run.key(), &entry.result, self.clock.now()));
                run.current = entry.result;
                ResolutionState::Done
            }
            None => {
                debug!(key = %run.request.key, "Cache miss");
                ResolutionState::Scraping
            }
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an [`Orchestrator`]; unset collaborators get network-backed defaults
///
/// `build` spawns the host throttle and ledger writer, so it must run inside
/// a tokio runtime.
pub struct OrchestratorBuilder {
    config: EngineConfig,
    cache: Option<Arc<dyn CacheStore>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    renderer: Option<Arc<dyn Renderer>>,
    waterfall: Option<Waterfall>,
    probe: Option<Arc<dyn DomainProbe>>,
    dns: Option<Arc<dyn DnsClient>>,
    throttle: Option<HostThrottle>,
    ledger: Option<Arc<dyn CostLedger>>,
    clock: Option<Arc<dyn Clock>>,
}

impl OrchestratorBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cache: None,
            fetcher: None,
            renderer: None,
            waterfall: None,
            probe: None,
            dns: None,
            throttle: None,
            ledger: None,
            clock: None,
        }
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn waterfall(mut self, waterfall: Waterfall) -> Self {
        self.waterfall = Some(waterfall);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn DomainProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn dns(mut self, dns: Arc<dyn DnsClient>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Share a throttle between orchestrators (e.g. per-call config overrides)
    pub fn throttle(mut self, throttle: HostThrottle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn CostLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Orchestrator, EngineError> {
        self.config.validate()?;

        let client = build_http_client(&self.config.http)?;
        let dns: Arc<dyn DnsClient> = match self.dns {
            Some(dns) => dns,
            None => Arc::new(HickoryDns::new()),
        };

        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new(client.clone())));
        let renderer: Arc<dyn Renderer> = match (self.renderer, &self.config.render_endpoint) {
            (Some(renderer), _) => renderer,
            (None, Some(endpoint)) => Arc::new(BrowserRenderer::new(client.clone(), endpoint.clone())),
            (None, None) => Arc::new(DisabledRenderer),
        };
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(NetworkProbe::new(dns.clone(), client.clone())));
        let waterfall = self
            .waterfall
            .unwrap_or_else(|| Waterfall::standard(client.clone(), dns.clone()));
        let validator = Validator::new(
            probe.clone(),
            self.config.discard_threshold,
            self.config.acceptance_threshold,
        );
        let throttle = self
            .throttle
            .unwrap_or_else(|| HostThrottle::spawn(self.config.host_min_interval()));
        let ledger = LedgerHandle::spawn(
            self.ledger
                .unwrap_or_else(|| Arc::new(MemoryLedger::new())),
        );
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::with_clock(clock.clone())));

        info!(
            acceptance = self.config.acceptance_threshold,
            discard = self.config.discard_threshold,
            max_retries = self.config.max_retries,
            waterfall = ?waterfall.ids(),
            render = self.config.render_endpoint.is_some(),
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            config: self.config,
            cache,
            fetcher,
            renderer,
            waterfall,
            probe,
            validator: Arc::new(validator),
            throttle,
            ledger,
            clock,
        })
    }
}
