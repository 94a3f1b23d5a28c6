//! Batch coordinator behavior: pool bound, host spacing, ordering, cancellation

mod helpers;

use enrich_engine::batch::BatchItem;
use enrich_engine::config::EngineConfig;
use enrich_engine::tiers::FetchError;
use enrich_engine::types::ResolutionStatus;
use helpers::*;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn domains(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("company-{:03}.example", i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_pool_never_exceeds_concurrency() {
    let fetcher = MockFetcher::always(ok_page(rich_page("Batch Co"))).with_latency(Duration::from_millis(50));
    let rig = RigBuilder::new(fetcher).build();

    let started = Instant::now();
    let report = rig.engine.resolve_batch(domains(100), Some(5)).await;
    let elapsed = started.elapsed();

    assert_eq!(report.completed, 100);
    assert_eq!(report.not_started, 0);
    assert!(rig.fetcher.max_in_flight() <= 5, "in flight: {}", rig.fetcher.max_in_flight());
    assert_eq!(rig.fetcher.max_in_flight(), 5);
    // 100 requests, 5 at a time, 50 ms each
    assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_default_concurrency_comes_from_config() {
    let fetcher = MockFetcher::always(ok_page(rich_page("Batch Co"))).with_latency(Duration::from_millis(50));
    let config = EngineConfig {
        concurrency: 2,
        ..EngineConfig::default()
    };
    let rig = RigBuilder::new(fetcher).config(config).build();

    rig.engine.resolve_batch(domains(10), None).await;

    assert_eq!(rig.fetcher.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_same_host_requests_are_spaced() {
    let fetcher = MockFetcher::always(ok_page(rich_page("Acme"))).with_latency(Duration::from_millis(200));
    let rig = RigBuilder::new(fetcher).build();
    let interval = rig.engine.config().host_min_interval();

    // Distinct spellings of one host: all miss the cache before any finishes
    let identifiers = vec![
        "acme.example".to_string(),
        "https://www.acme.example/".to_string(),
        "ACME.example/contact".to_string(),
    ];
    let report = rig.engine.resolve_batch(identifiers, Some(3)).await;

    assert_eq!(report.completed, 3);
    assert_eq!(rig.fetcher.calls(), 3);
    let times = rig.fetcher.call_times();
    let mut sorted = times.clone();
    sorted.sort();
    for pair in sorted.windows(2) {
        assert!(pair[1] - pair[0] >= interval, "requests {:?} apart", pair[1] - pair[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_http_checks_share_host_spacing_with_fetches() {
    // 404 leaves the host unverified, so validation sends its own HTTP check
    let fetcher = MockFetcher::always(Err(FetchError::ClientStatus(404))).with_latency(Duration::from_millis(200));
    let rig = RigBuilder::new(fetcher).build();
    let interval = rig.engine.config().host_min_interval();

    let identifiers = vec![
        "acme.example".to_string(),
        "https://www.acme.example/".to_string(),
        "ACME.example/contact".to_string(),
    ];
    let report = rig.engine.resolve_batch(identifiers, Some(3)).await;

    assert_eq!(report.completed, 3);
    assert_eq!(rig.fetcher.calls(), 3);
    assert_eq!(rig.probe.http_check_urls(), vec!["https://acme.example/".to_string(); 3]);

    let mut contacts = rig.fetcher.call_times();
    contacts.extend(rig.probe.http_check_times());
    contacts.sort();
    assert_eq!(contacts.len(), 6);
    for pair in contacts.windows(2) {
        assert!(pair[1] - pair[0] >= interval, "host contacted {:?} apart", pair[1] - pair[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_different_hosts_are_not_spaced() {
    let fetcher = MockFetcher::always(ok_page(rich_page("Batch Co"))).with_latency(Duration::from_millis(10));
    let rig = RigBuilder::new(fetcher).build();

    rig.engine.resolve_batch(domains(3), Some(3)).await;

    let times = rig.fetcher.call_times();
    let first = *times.iter().min().unwrap();
    let last = *times.iter().max().unwrap();
    assert!(last - first < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_results_keep_input_order() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Batch Co")))).build();
    let identifiers = vec![
        "zeta.example".to_string(),
        "alpha.example".to_string(),
        "   ".to_string(),
        "mid.example".to_string(),
    ];

    let report = rig.engine.resolve_batch(identifiers, Some(4)).await;

    assert_eq!(report.items.len(), 4);
    let keys: Vec<&str> = report.results().iter().map(|r| r.lookup_key.as_str()).collect();
    assert_eq!(keys, vec!["zeta.example", "alpha.example", "mid.example"]);
    assert!(matches!(&report.items[2], BatchItem::Rejected { .. }));
    assert_eq!(report.completed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_batch_starts_nothing() {
    let rig = RigBuilder::new(MockFetcher::always(ok_page(rich_page("Batch Co")))).build();
    let token = CancellationToken::new();
    token.cancel();

    let report = rig
        .engine
        .resolve_batch_cancellable(domains(8), Some(2), token)
        .await;

    assert_eq!(report.not_started, 8);
    assert_eq!(report.completed, 0);
    assert!(report
        .items
        .iter()
        .all(|item| matches!(item, BatchItem::NotStarted { .. })));
    assert_eq!(rig.network_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_lets_in_flight_work_finish() {
    let fetcher = MockFetcher::always(ok_page(rich_page("Batch Co"))).with_latency(Duration::from_millis(100));
    let rig = RigBuilder::new(fetcher).build();
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });

    let report = rig
        .engine
        .resolve_batch_cancellable(domains(20), Some(2), token)
        .await;

    // Two waves dispatched before the token fired; each completes normally
    assert_eq!(report.completed, 4);
    assert_eq!(report.not_started, 16);
    for result in report.results() {
        assert_eq!(result.status, ResolutionStatus::Resolved);
    }
}

#[tokio::test(start_paused = true)]
async fn test_batch_with_config_uses_its_pool_size() {
    let fetcher = MockFetcher::always(ok_page(rich_page("Batch Co"))).with_latency(Duration::from_millis(50));
    let rig = RigBuilder::new(fetcher).build();
    let config = EngineConfig {
        concurrency: 3,
        ..EngineConfig::default()
    };

    let report = rig
        .engine
        .resolve_batch_with_config(domains(12), config)
        .await
        .unwrap();

    assert_eq!(report.completed, 12);
    assert_eq!(rig.fetcher.max_in_flight(), 3);
}
