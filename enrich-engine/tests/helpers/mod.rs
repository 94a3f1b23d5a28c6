//! Test doubles shared by the integration tests
//!
//! Every double counts its calls so tests can assert on network usage.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use enrich_common::ManualClock;
use enrich_engine::cache::MemoryCache;
use enrich_engine::config::EngineConfig;
use enrich_engine::ledger::MemoryLedger;
use enrich_engine::sources::{SourceAdapter, SourceError, Waterfall};
use enrich_engine::tiers::{FetchError, FetchResponse, Fetcher, RenderError, RenderOutput, Renderer};
use enrich_engine::types::{EnrichmentRequest, RawFields, SourceId};
use enrich_engine::validate::DomainProbe;
use enrich_engine::{Engine, Orchestrator};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Pages
// ============================================================================

/// Page whose only extractable fact is a JSON-LD organization name
pub fn rich_page(name: &str) -> String {
    let filler = "Lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor \
                  incididunt ut labore et dolore magna aliqua. ";
    format!(
        r#"<html><head>
<title>{name}</title>
<script type="application/ld+json">{{"@context":"https://schema.org","@type":"Organization","name":"{name}"}}</script>
</head><body><main><p>{body}</p></main></body></html>"#,
        name = name,
        body = filler.repeat(6)
    )
}

/// Near-empty page that forces render escalation
pub const THIN_PAGE: &str = "<html><head></head><body><div id=\"root\"></div></body></html>";

pub fn ok_page(body: impl Into<String>) -> Result<FetchResponse, FetchError> {
    Ok(FetchResponse {
        body: body.into(),
        status_code: 200,
        final_url: "https://example/".to_string(),
    })
}

// ============================================================================
// Fetch tier
// ============================================================================

/// Scripted fetcher: pops queued responses, then repeats `fallback`
pub struct MockFetcher {
    queue: Mutex<VecDeque<Result<FetchResponse, FetchError>>>,
    fallback: Result<FetchResponse, FetchError>,
    latency: Duration,
    calls: AtomicUsize,
    call_log: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn always(response: Result<FetchResponse, FetchError>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: response,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn scripted(
        responses: Vec<Result<FetchResponse, FetchError>>,
        fallback: Result<FetchResponse, FetchError>,
    ) -> Self {
        let fetcher = Self::always(fallback);
        *fetcher.queue.lock().unwrap() = responses.into();
        fetcher
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_log.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.call_log.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().unwrap().push((url.to_string(), Instant::now()));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let queued = self.queue.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}

// ============================================================================
// Render tier
// ============================================================================

pub struct MockRenderer {
    response: Result<RenderOutput, RenderError>,
    latency: Duration,
    calls: AtomicUsize,
}

impl MockRenderer {
    pub fn new(response: Result<RenderOutput, RenderError>) -> Self {
        Self {
            response,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn unavailable() -> Self {
        Self::new(Err(RenderError::Unavailable))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(&self, _url: &str) -> Result<RenderOutput, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.response.clone()
    }

    fn is_enabled(&self) -> bool {
        self.response != Err(RenderError::Unavailable)
    }
}

// ============================================================================
// Probes
// ============================================================================

pub struct MockProbe {
    pub resolves: bool,
    pub mx: bool,
    pub http: bool,
    calls: AtomicUsize,
    http_log: Mutex<Vec<(String, Instant)>>,
}

impl MockProbe {
    pub fn new(resolves: bool, mx: bool, http: bool) -> Self {
        Self {
            resolves,
            mx,
            http,
            calls: AtomicUsize::new(0),
            http_log: Mutex::new(Vec::new()),
        }
    }

    /// When each HTTP check was sent
    pub fn http_check_times(&self) -> Vec<Instant> {
        self.http_log.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn http_check_urls(&self) -> Vec<String> {
        self.http_log.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn healthy() -> Self {
        Self::new(true, true, true)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomainProbe for MockProbe {
    async fn resolves(&self, _domain: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.resolves
    }

    async fn has_mx(&self, _domain: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mx
    }

    async fn http_answers(&self, url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.http_log.lock().unwrap().push((url.to_string(), Instant::now()));
        self.http
    }
}

// ============================================================================
// Backup sources
// ============================================================================

pub struct MockSource {
    id: SourceId,
    response: Result<RawFields, SourceError>,
    latency: Duration,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(id: SourceId, response: Result<RawFields, SourceError>) -> Self {
        Self {
            id,
            response,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn not_found(id: SourceId) -> Self {
        Self::new(id, Err(SourceError::NotFound))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn lookup(&self, _request: &EnrichmentRequest) -> Result<RawFields, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.response.clone()
    }
}

// ============================================================================
// Engine assembly
// ============================================================================

pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Engine wired entirely to doubles, plus handles to inspect them
pub struct TestRig {
    pub engine: Engine,
    pub fetcher: Arc<MockFetcher>,
    pub renderer: Arc<MockRenderer>,
    pub probe: Arc<MockProbe>,
    pub sources: Vec<Arc<MockSource>>,
    pub cache: Arc<MemoryCache>,
    pub ledger: Arc<MemoryLedger>,
    pub clock: ManualClock,
}

impl TestRig {
    pub fn source_calls(&self) -> usize {
        self.sources.iter().map(|s| s.calls()).sum()
    }

    /// Calls that would have touched the network
    pub fn network_calls(&self) -> usize {
        self.fetcher.calls() + self.renderer.calls() + self.probe.calls() + self.source_calls()
    }
}

pub struct RigBuilder {
    config: EngineConfig,
    fetcher: MockFetcher,
    renderer: MockRenderer,
    probe: MockProbe,
    sources: Vec<MockSource>,
}

impl RigBuilder {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self {
            config: EngineConfig::default(),
            fetcher,
            renderer: MockRenderer::unavailable(),
            probe: MockProbe::healthy(),
            sources: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn renderer(mut self, renderer: MockRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn probe(mut self, probe: MockProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn source(mut self, source: MockSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Must run inside a tokio runtime
    pub fn build(self) -> TestRig {
        let clock = ManualClock::new(start_time());
        let fetcher = Arc::new(self.fetcher);
        let renderer = Arc::new(self.renderer);
        let probe = Arc::new(self.probe);
        let sources: Vec<Arc<MockSource>> = self.sources.into_iter().map(Arc::new).collect();
        let cache = Arc::new(MemoryCache::with_clock(Arc::new(clock.clone())));
        let ledger = Arc::new(MemoryLedger::new());

        let waterfall = Waterfall::new(
            sources
                .iter()
                .map(|s| s.clone() as Arc<dyn SourceAdapter>)
                .collect(),
        );

        let orchestrator = Orchestrator::builder(self.config)
            .fetcher(fetcher.clone())
            .renderer(renderer.clone())
            .probe(probe.clone())
            .waterfall(waterfall)
            .cache(cache.clone())
            .ledger(ledger.clone())
            .clock(Arc::new(clock.clone()))
            .build()
            .expect("test engine builds");

        TestRig {
            engine: Engine::new(orchestrator),
            fetcher,
            renderer,
            probe,
            sources,
            cache,
            ledger,
            clock,
        }
    }
}
