mod common;

use common::{fast_config, FakeAws, ManualClock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vpc_collector::{
    ApiError, CacheStore, CancelSignal, CancelToken, CollectionRequest, Collector,
    ConcurrentCollector, ErrorKind, FileBackend, MemoryBackend, SectionKind, SectionRecord,
    SequentialCollector, Source,
};

fn sequential(client: Arc<FakeAws>) -> SequentialCollector {
    SequentialCollector::new(client).with_config(fast_config())
}

fn concurrent(client: Arc<FakeAws>) -> ConcurrentCollector {
    ConcurrentCollector::new(client).with_config(fast_config())
}

fn records_json(report: &vpc_collector::Report) -> Vec<(SectionKind, String)> {
    report
        .successes()
        .map(|(kind, record)| (kind, serde_json::to_string(record).unwrap()))
        .collect()
}

#[tokio::test]
async fn test_report_has_one_entry_per_requested_section() {
    let client = Arc::new(FakeAws::new());
    let request = CollectionRequest::new("us-east-1", "vpc-1").with_cache(false);

    let report = concurrent(client)
        .collect(&request, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.len(), request.sections.len());
    assert_eq!(report.len(), 19);
    assert!(!report.is_partial(), "failures: {:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(report.resource_id(), "vpc-1");

    let Some(SectionRecord::DhcpOptions(dhcp)) = report.get(SectionKind::DhcpOptions).and_then(|r| r.record()) else {
        panic!("dhcp options missing");
    };
    assert_eq!(dhcp.configurations["domain-name"], vec!["ec2.internal".to_string()]);
}

#[tokio::test]
async fn test_second_collect_within_ttl_is_cached_and_identical() {
    let client = Arc::new(FakeAws::new());
    let collector = sequential(client.clone());
    let request = CollectionRequest::new("us-east-1", "vpc-1");

    let first = collector.collect(&request, CancelToken::never()).await.unwrap();
    let calls_after_first = client.total_calls();
    let second = collector.collect(&request, CancelToken::never()).await.unwrap();

    assert_eq!(client.total_calls(), calls_after_first);
    assert!(first.sections().values().all(|r| r.source() == Some(Source::Fresh)));
    assert!(second.sections().values().all(|r| r.source() == Some(Source::Cached)));
    assert_eq!(records_json(&first), records_json(&second));
}

#[tokio::test]
async fn test_sequential_and_concurrent_agree() {
    let request = CollectionRequest::new("us-east-1", "vpc-1").with_cache(false);
    let failing = || {
        Arc::new(FakeAws::new().failing("DescribeFlowLogs", ApiError::AccessDenied("denied".into())))
    };

    let seq = sequential(failing())
        .collect(&request, CancelToken::never())
        .await
        .unwrap();
    let conc = concurrent(failing())
        .collect(&request, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(seq.sections(), conc.sections());
    assert!(seq.is_partial() && conc.is_partial());
}

#[tokio::test]
async fn test_one_failing_section_does_not_affect_others() {
    let client = Arc::new(
        FakeAws::new().failing("DescribeSecurityGroups", ApiError::AccessDenied("denied".into())),
    );
    let request = CollectionRequest::new("us-east-1", "vpc-1").with_cache(false);

    let report = concurrent(client)
        .collect(&request, CancelToken::never())
        .await
        .unwrap();

    assert!(report.is_partial());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, SectionKind::SecurityGroups);
    assert_eq!(failures[0].1.kind, ErrorKind::NotAuthorized);
    assert!(!failures[0].1.retryable);
    assert_eq!(report.successes().count(), 18);
}

#[tokio::test]
async fn test_expired_cache_entries_are_refetched() {
    let client = Arc::new(FakeAws::new());
    let clock = Arc::new(ManualClock::new());
    let cache = CacheStore::new(Arc::new(MemoryBackend::new())).with_clock(clock.clone());
    let collector = sequential(client.clone()).with_cache(cache);
    let request =
        CollectionRequest::new("us-east-1", "vpc-1").with_sections([SectionKind::Subnets]);

    collector.collect(&request, CancelToken::never()).await.unwrap();
    clock.advance_secs(301);
    let report = collector.collect(&request, CancelToken::never()).await.unwrap();

    assert_eq!(
        report.get(SectionKind::Subnets).unwrap().source(),
        Some(Source::Fresh)
    );
    assert_eq!(client.calls("DescribeSubnets"), 2);
}

#[tokio::test]
async fn test_store_ttl_governs_collected_entries() {
    let client = Arc::new(FakeAws::new());
    let clock = Arc::new(ManualClock::new());
    let cache = CacheStore::new(Arc::new(MemoryBackend::new()))
        .with_clock(clock.clone())
        .with_default_ttl(Duration::from_secs(60));
    let collector = concurrent(client.clone()).with_cache(cache);
    let request =
        CollectionRequest::new("us-east-1", "vpc-1").with_sections([SectionKind::Subnets]);

    collector.collect(&request, CancelToken::never()).await.unwrap();
    clock.advance_secs(59);
    let within = collector.collect(&request, CancelToken::never()).await.unwrap();
    clock.advance_secs(61);
    let after = collector.collect(&request, CancelToken::never()).await.unwrap();

    assert_eq!(within.get(SectionKind::Subnets).unwrap().source(), Some(Source::Cached));
    assert_eq!(after.get(SectionKind::Subnets).unwrap().source(), Some(Source::Fresh));
    assert_eq!(client.calls("DescribeSubnets"), 2);
}

#[tokio::test]
async fn test_file_cache_is_shared_across_collectors() {
    let dir = tempfile::tempdir().unwrap();
    let request = CollectionRequest::new("us-east-1", "vpc-1")
        .with_sections([SectionKind::Vpc, SectionKind::ElasticIps]);

    let first_client = Arc::new(FakeAws::new());
    sequential(first_client)
        .with_cache(CacheStore::new(Arc::new(FileBackend::new(dir.path()))))
        .collect(&request, CancelToken::never())
        .await
        .unwrap();

    let second_client = Arc::new(FakeAws::new());
    let report = concurrent(second_client.clone())
        .with_cache(CacheStore::new(Arc::new(FileBackend::new(dir.path()))))
        .collect(&request, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(second_client.total_calls(), 0);
    assert!(report.sections().values().all(|r| r.source() == Some(Source::Cached)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrency_and_wall_clock() {
    let latency = Duration::from_millis(40);
    let client = Arc::new(FakeAws::new().with_latency(latency));
    let request = CollectionRequest::new("us-east-1", "vpc-1")
        .with_cache(false)
        .with_concurrency_limit(3);

    let started = Instant::now();
    let report = concurrent(client.clone())
        .collect(&request, CancelToken::never())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.len(), 19);
    assert!(client.peak_in_flight() <= 3);

    // ceil(19 / 3) rounds of at least one call each
    let rounds = 7;
    assert!(elapsed >= latency * rounds);
    assert!(elapsed < latency * rounds * 5, "took {elapsed:?}");
}

#[tokio::test]
async fn test_throttled_section_is_partial_and_retryable() {
    let client = Arc::new(
        FakeAws::new().failing("DescribeNatGateways", ApiError::Throttled("Rate exceeded".into())),
    );
    let request = CollectionRequest::new("us-east-1", "vpc-1")
        .with_sections([SectionKind::Vpc, SectionKind::Subnets, SectionKind::NatGateways])
        .with_cache(false);

    let report = concurrent(client.clone())
        .collect(&request, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert!(report.is_partial());
    assert!(report.get(SectionKind::Vpc).unwrap().is_success());
    assert!(report.get(SectionKind::Subnets).unwrap().is_success());

    let nat = report.get(SectionKind::NatGateways).unwrap().failure().unwrap();
    assert_eq!(nat.kind, ErrorKind::RateLimited);
    assert!(nat.retryable);
    assert_eq!(client.calls("DescribeNatGateways"), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_returns_early() {
    let request = CollectionRequest::new("us-east-1", "vpc-1").with_cache(false);

    for use_pool in [false, true] {
        let client = Arc::new(FakeAws::new().with_latency(Duration::from_secs(30)));
        let signal = CancelSignal::new();
        let token = signal.token();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            signal.cancel();
        });

        let started = Instant::now();
        let report = if use_pool {
            concurrent(client).collect(&request, token).await.unwrap()
        } else {
            sequential(client).collect(&request, token).await.unwrap()
        };
        canceller.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.len(), 19);
        assert!(report.is_partial());
        assert!(report
            .failures()
            .all(|(_, failure)| failure.kind == ErrorKind::Cancelled && !failure.retryable));
    }
}

#[tokio::test]
async fn test_report_serializes_with_section_names() {
    let client = Arc::new(FakeAws::new());
    let request = CollectionRequest::new("us-east-1", "vpc-1")
        .with_sections([SectionKind::Vpc, SectionKind::DirectConnectVifs])
        .with_cache(false);

    let report = sequential(client)
        .collect(&request, CancelToken::never())
        .await
        .unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["partial"], false);
    assert_eq!(
        json["sections"]["vpc"]["success"]["record"]["vpc"]["Name"],
        "prod"
    );
    assert!(json["sections"]["direct_connect_vifs"]["success"].is_object());
}

#[test]
fn test_section_names_parse() {
    assert_eq!("nat_gateways".parse::<SectionKind>().unwrap(), SectionKind::NatGateways);
    assert_eq!("vpc-peering".parse::<SectionKind>().unwrap(), SectionKind::VpcPeering);
    assert!("load_balancers".parse::<SectionKind>().is_err());
}
