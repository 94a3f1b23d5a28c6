//! End-to-end resolution behavior through the public engine API
//!
//! All tiers and sources are doubles from `helpers`; time-sensitive tests run
//! on a paused tokio clock.

mod helpers;

use enrich_engine::config::{EngineConfig, MAX_BACKOFF_BASE_MS, MAX_CACHE_TTL_SECS, MAX_REQUEST_TIMEOUT_SECS};
use enrich_engine::sources::SourceError;
use enrich_engine::tiers::{FetchError, RenderOutput};
use enrich_engine::types::{
    FieldData, FieldName, RawField, RawFields, RequestHints, ResolutionStatus, SourceId,
};
use enrich_engine::cache::CacheStore;
use helpers::*;
use std::time::Duration;

fn registration_fields() -> RawFields {
    let mut fields = RawFields::new();
    fields.set(FieldName::Name, RawField::text("Spa Heavy Inc", 60, SourceId::DomainRegistration));
    fields.set(FieldName::FoundedYear, RawField::integer(1999, 55, SourceId::DomainRegistration));
    fields
}

fn spa_heavy_render() -> RenderOutput {
    RenderOutput {
        extracted_text: "We are a team of 51-200 employees.".to_string(),
        title: Some("Spa Heavy – Loading".to_string()),
        ..RenderOutput::default()
    }
}

// ============================================================================
// Example scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_known_good_domain_resolves_from_fetch() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Known Good"))))
        .source(MockSource::not_found(SourceId::DnsRecords))
        .build();

    let result = rig.engine.resolve("known-good.example").await.unwrap();

    assert_eq!(result.confidence(FieldName::PrimaryDomain), 90);
    assert_eq!(result.confidence(FieldName::Name), 85);
    assert_eq!(result.value(FieldName::Name), Some(&FieldData::Text("Known Good".into())));
    assert_eq!(result.overall_confidence, 87);
    assert_eq!(result.status, ResolutionStatus::Resolved);

    // Accepted after scraping: no backup source, no render
    assert_eq!(rig.source_calls(), 0);
    assert_eq!(rig.renderer.calls(), 0);

    let entry = rig.cache.get("known-good.example").await.unwrap();
    assert_eq!(entry.expires_at - entry.created_at, chrono::Duration::days(7));
}

#[tokio::test(start_paused = true)]
async fn test_repeat_within_ttl_is_served_from_cache() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Known Good")))).build();

    let first = rig.engine.resolve("known-good.example").await.unwrap();
    let calls_after_first = rig.network_calls();

    rig.clock.advance(Duration::from_secs(3600));
    let second = rig.engine.resolve("https://www.Known-Good.example/about").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(rig.network_calls(), calls_after_first);

    rig.engine.orchestrator().ledger().flush().await.unwrap();
    let entries = rig.ledger.entries().await;
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].cache_hit);
    assert!(entries[1].cache_hit);
    assert_eq!(entries[1].satisfied_by, Some(SourceId::Cache));
    assert_eq!(entries[1].estimated_cost, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_thin_page_escalates_to_render_then_backup() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE)))
        .renderer(MockRenderer::new(Ok(spa_heavy_render())))
        .source(MockSource::new(SourceId::DomainRegistration, Ok(registration_fields())))
        .source(MockSource::not_found(SourceId::KnowledgeGraph))
        .build();

    let result = rig.engine.resolve("spa-heavy.example").await.unwrap();

    assert_eq!(rig.fetcher.calls(), 1);
    assert_eq!(rig.renderer.calls(), 1);
    assert_eq!(result.value(FieldName::Name), Some(&FieldData::Text("Spa Heavy".into())));
    // Render title (55) corroborated by the registrant organization
    assert_eq!(result.confidence(FieldName::Name), 70);
    assert_eq!(result.field(FieldName::Name).unwrap().source, Some(SourceId::Render));
    assert_eq!(
        result.value(FieldName::EmployeeCountRange),
        Some(&FieldData::Text("51-200".into()))
    );
    assert_eq!(result.confidence(FieldName::EmployeeCountRange), 60);
    assert_eq!(result.value(FieldName::FoundedYear), Some(&FieldData::Integer(1999)));
    assert_eq!(result.overall_confidence, 72);
    assert_eq!(result.status, ResolutionStatus::Resolved);
    assert!(result.sources.contains(&SourceId::DomainRegistration));

    // Acceptance reached: the knowledge graph is never consulted
    assert_eq!(rig.sources[1].calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_nonexistent_domain_is_negatively_cached() {
    let rig = RigBuilder::new(MockFetcher::always(Err(FetchError::DnsFailure(
        "nonexistent-xyz.invalid".into(),
    ))))
    .renderer(MockRenderer::new(Ok(spa_heavy_render())))
    .source(MockSource::not_found(SourceId::DnsRecords))
    .source(MockSource::not_found(SourceId::DomainRegistration))
    .build();

    let result = rig.engine.resolve("nonexistent-xyz.invalid").await.unwrap();

    assert_eq!(result.status, ResolutionStatus::Unresolved);
    assert_eq!(result.overall_confidence, 0);
    assert!(result.fields.values().all(|v| v.is_null() && v.confidence == 0));

    // Terminal DNS failure: no retries, no render
    assert_eq!(rig.fetcher.calls(), 1);
    assert_eq!(rig.renderer.calls(), 0);
    assert_eq!(rig.sources[0].calls(), 1);
    assert_eq!(rig.sources[1].calls(), 1);

    let entry = rig.cache.get("nonexistent-xyz.invalid").await.unwrap();
    assert_eq!(entry.expires_at - entry.created_at, chrono::Duration::hours(1));
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_negative_entry_expires_and_is_recomputed() {
    let rig = RigBuilder::new(MockFetcher::always(Err(FetchError::DnsFailure("gone.example".into()))))
        .build();

    rig.engine.resolve("gone.example").await.unwrap();
    assert_eq!(rig.fetcher.calls(), 1);

    rig.clock.advance(Duration::from_secs(30 * 60));
    rig.engine.resolve("gone.example").await.unwrap();
    assert_eq!(rig.fetcher.calls(), 1, "within negative TTL: no new call");

    rig.clock.advance(Duration::from_secs(31 * 60));
    rig.engine.resolve("gone.example").await.unwrap();
    assert_eq!(rig.fetcher.calls(), 2, "after expiry: resolved again");
}

#[tokio::test(start_paused = true)]
async fn test_positive_entry_expires_after_ttl() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Known Good")))).build();

    rig.engine.resolve("known-good.example").await.unwrap();
    rig.clock.advance(Duration::from_secs(7 * 24 * 3600 + 1));
    rig.engine.resolve("known-good.example").await.unwrap();

    assert_eq!(rig.fetcher.calls(), 2);
}

// ============================================================================
// Retry and escalation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_are_bounded() {
    let rig = RigBuilder::new(MockFetcher::always(Err(FetchError::ServerStatus(503))))
        .renderer(MockRenderer::unavailable())
        .build();

    let result = rig.engine.resolve("flaky.example").await.unwrap();

    assert_eq!(rig.fetcher.calls(), 4);
    // Exhausted retries escalate to render once
    assert_eq!(rig.renderer.calls(), 1);
    // The domain was never reached, but DNS still answers through the probe
    assert_eq!(result.confidence(FieldName::PrimaryDomain), 90);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let rig = RigBuilder::new(MockFetcher::always(Err(FetchError::Timeout))).build();

    rig.engine.resolve("slow.example").await.unwrap();

    let times = rig.fetcher.call_times();
    assert_eq!(times.len(), 4);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let expected = [2, 4, 8];
    for (gap, secs) in gaps.iter().zip(expected) {
        let target = Duration::from_secs(secs);
        assert!(
            *gap >= target && *gap < target + Duration::from_millis(100),
            "gap {:?} not within tolerance of {:?}",
            gap,
            target
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_transient_failure() {
    let fetcher = MockFetcher::scripted(
        vec![Err(FetchError::Connection("reset".into()))],
        ok_page(rich_page("Known Good")),
    );
    let rig = RigBuilder::new(fetcher).build();

    let result = rig.engine.resolve("known-good.example").await.unwrap();

    assert_eq!(rig.fetcher.calls(), 2);
    assert_eq!(result.status, ResolutionStatus::Resolved);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_status_renders_without_retry() {
    let rig = RigBuilder::new(MockFetcher::always(Err(FetchError::ClientStatus(404))))
        .renderer(MockRenderer::new(Ok(spa_heavy_render())))
        .build();

    let result = rig.engine.resolve("spa-heavy.example").await.unwrap();

    assert_eq!(rig.fetcher.calls(), 1);
    assert_eq!(rig.renderer.calls(), 1);
    assert_eq!(result.value(FieldName::Name), Some(&FieldData::Text("Spa Heavy".into())));
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_means_single_attempt() {
    let config = EngineConfig {
        max_retries: 0,
        ..EngineConfig::default()
    };
    let rig = RigBuilder::new(MockFetcher::always(Err(FetchError::ServerStatus(500))))
        .config(config)
        .build();

    rig.engine.resolve("flaky.example").await.unwrap();
    assert_eq!(rig.fetcher.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_forces_completion() {
    let config = EngineConfig {
        request_timeout_secs: 5,
        ..EngineConfig::default()
    };
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Known Good"))).with_latency(Duration::from_secs(60)))
        .config(config)
        .source(MockSource::not_found(SourceId::DnsRecords))
        .build();

    let started = tokio::time::Instant::now();
    let result = rig.engine.resolve("hung.example").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(rig.fetcher.calls(), 1);
    // Deadline passed: neither render nor backups are attempted
    assert_eq!(rig.renderer.calls(), 0);
    assert_eq!(rig.source_calls(), 0);
    assert!(result.value(FieldName::Name).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_cuts_off_hung_backup_source() {
    let config = EngineConfig {
        request_timeout_secs: 5,
        ..EngineConfig::default()
    };
    let mut registration = RawFields::new();
    registration.set(FieldName::Name, RawField::text("Never Arrives", 90, SourceId::DomainRegistration));

    // Name key without a domain: straight to the waterfall
    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE)))
        .config(config)
        .source(MockSource::not_found(SourceId::DnsRecords))
        .source(
            MockSource::new(SourceId::DomainRegistration, Ok(registration)).with_latency(Duration::from_secs(60)),
        )
        .source(MockSource::not_found(SourceId::KnowledgeGraph))
        .build();

    let started = tokio::time::Instant::now();
    let result = rig.engine.resolve("Stalled Registry Co").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(rig.fetcher.calls(), 0);
    assert_eq!(rig.sources[0].calls(), 1);
    assert_eq!(rig.sources[1].calls(), 1);
    assert_eq!(rig.sources[2].calls(), 0);
    assert_ne!(
        result.value(FieldName::Name),
        Some(&FieldData::Text("Never Arrives".into()))
    );
    assert!(!result.sources.contains(&SourceId::DomainRegistration));

    let cached = rig.cache.get(&result.lookup_key).await.unwrap();
    assert_eq!(cached.result, result);

    rig.engine.orchestrator().ledger().flush().await.unwrap();
    let entries = rig.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].sources_used,
        vec![SourceId::DnsRecords, SourceId::DomainRegistration]
    );
    assert_eq!(entries[0].attempt_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_cuts_off_hung_render() {
    let config = EngineConfig {
        request_timeout_secs: 5,
        ..EngineConfig::default()
    };
    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE)))
        .config(config)
        .renderer(MockRenderer::new(Ok(spa_heavy_render())).with_latency(Duration::from_secs(60)))
        .build();

    let started = tokio::time::Instant::now();
    let result = rig.engine.resolve("stalled-render.example").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(rig.renderer.calls(), 1);
    assert!(result.value(FieldName::EmployeeCountRange).is_none());
    assert!(!result.sources.contains(&SourceId::Render));
    // The fetched page still verified the domain
    assert_eq!(result.confidence(FieldName::PrimaryDomain), 90);
    assert_eq!(result.overall_confidence, 90);
    assert_eq!(result.status, ResolutionStatus::Resolved);
    assert!(result.fields.values().all(|v| !v.is_null() || v.confidence == 0));

    rig.engine.orchestrator().ledger().flush().await.unwrap();
    let entries = rig.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sources_used, vec![SourceId::Fetch, SourceId::Render]);
    assert_eq!(entries[0].attempt_count, 2);
    assert!(rig.cache.get("stalled-render.example").await.is_some());
}

// ============================================================================
// Waterfall
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_waterfall_stops_once_accepted() {
    let mut graph = RawFields::new();
    graph.set(FieldName::Name, RawField::text("Acme Widgets", 80, SourceId::KnowledgeGraph));
    graph.set(
        FieldName::PrimaryDomain,
        RawField::text("acmewidgets.example", 80, SourceId::KnowledgeGraph),
    );

    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE)))
        .source(MockSource::new(SourceId::DnsRecords, Err(SourceError::NotApplicable)))
        .source(MockSource::new(SourceId::KnowledgeGraph, Ok(graph)))
        .source(MockSource::not_found(SourceId::DomainRegistration))
        .build();

    let result = rig.engine.resolve("Acme Widgets").await.unwrap();

    // Name key without a known domain: scraping skipped
    assert_eq!(rig.fetcher.calls(), 0);
    assert_eq!(result.status, ResolutionStatus::Resolved);
    assert_eq!(result.overall_confidence, 85);
    assert_eq!(rig.sources[1].calls(), 1);
    assert_eq!(rig.sources[2].calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backup_never_overwrites_validated_fields() {
    let mut graph = RawFields::new();
    graph.set(FieldName::Name, RawField::text("Completely Different", 90, SourceId::KnowledgeGraph));
    graph.set(FieldName::FoundedYear, RawField::integer(1987, 70, SourceId::KnowledgeGraph));

    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE)))
        .renderer(MockRenderer::new(Ok(spa_heavy_render())))
        .source(MockSource::new(SourceId::KnowledgeGraph, Ok(graph)))
        .build();

    let result = rig.engine.resolve("spa-heavy.example").await.unwrap();

    assert_eq!(result.value(FieldName::Name), Some(&FieldData::Text("Spa Heavy".into())));
    assert_eq!(result.confidence(FieldName::Name), 55);
    assert_eq!(result.value(FieldName::FoundedYear), Some(&FieldData::Integer(1987)));
}

#[tokio::test(start_paused = true)]
async fn test_hinted_domain_is_scraped_for_name_key() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Acme Widgets")))).build();
    let hints = RequestHints {
        known_domain: Some("https://acmewidgets.example".into()),
        known_location: None,
    };

    let result = rig.engine.resolve_with_hints("Acme Widgets", hints).await.unwrap();

    assert_eq!(rig.fetcher.urls(), vec!["https://acmewidgets.example/".to_string()]);
    assert_eq!(result.lookup_key, "acme widgets");
    assert_eq!(result.status, ResolutionStatus::Resolved);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_identifier_is_rejected() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE))).build();
    assert!(rig.engine.resolve("   ").await.is_err());
    assert_eq!(rig.network_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_per_call_config_is_rejected() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE))).build();
    let config = EngineConfig {
        discard_threshold: 80,
        acceptance_threshold: 50,
        ..EngineConfig::default()
    };
    assert!(rig.engine.resolve_with_config("acme.example", config).await.is_err());
    assert_eq!(rig.network_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_durations_are_rejected_before_any_call() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(THIN_PAGE))).build();

    for config in [
        EngineConfig {
            request_timeout_secs: u64::MAX,
            ..EngineConfig::default()
        },
        EngineConfig {
            cache_ttl_seconds: 10_000_000_000_000,
            ..EngineConfig::default()
        },
        EngineConfig {
            backoff_base_ms: u64::MAX,
            ..EngineConfig::default()
        },
    ] {
        assert!(rig.engine.resolve_with_config("acme.example", config).await.is_err());
    }
    assert_eq!(rig.network_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_largest_accepted_durations_resolve() {
    let config = EngineConfig {
        request_timeout_secs: MAX_REQUEST_TIMEOUT_SECS,
        cache_ttl_seconds: MAX_CACHE_TTL_SECS,
        negative_cache_ttl_seconds: MAX_CACHE_TTL_SECS,
        backoff_base_ms: MAX_BACKOFF_BASE_MS,
        backoff_multiplier: u32::MAX,
        max_retries: 5,
        ..EngineConfig::default()
    };
    let rig = RigBuilder::new(MockFetcher::always(Err(FetchError::ServerStatus(503))))
        .config(config)
        .build();

    let result = rig.engine.resolve("far-future.example").await.unwrap();

    // One backoff fits inside the day-long deadline; the next saturates past it
    assert_eq!(rig.fetcher.calls(), 2);
    assert_eq!(result.status, ResolutionStatus::Resolved);
    let entry = rig.cache.get("far-future.example").await.unwrap();
    assert_eq!(
        entry.expires_at - entry.created_at,
        chrono::Duration::seconds(MAX_CACHE_TTL_SECS as i64)
    );
}

#[tokio::test(start_paused = true)]
async fn test_per_call_acceptance_threshold_applies() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Known Good")))).build();
    let config = EngineConfig {
        acceptance_threshold: 95,
        ..EngineConfig::default()
    };

    let result = rig.engine.resolve_with_config("known-good.example", config).await.unwrap();

    assert_eq!(result.overall_confidence, 87);
    assert_eq!(result.status, ResolutionStatus::PartiallyResolved);
}
