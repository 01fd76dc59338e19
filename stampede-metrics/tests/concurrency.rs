//! Concurrent writers against one registry

use std::sync::Arc;
use stampede_metrics::{names, MetricKind, MetricsRegistry, TrendSummary};

fn sample(writer: usize, i: usize) -> f64 {
    // Deterministic but unordered spread of latencies
    ((writer * 7919 + i * 104_729) % 5000) as f64 / 2.0
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_trend_matches_sequential() {
    const WRITERS: usize = 50;
    const SAMPLES: usize = 1000;

    let registry = Arc::new(MetricsRegistry::new());
    let mut tasks = Vec::with_capacity(WRITERS);

    for writer in 0..WRITERS {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let trend = registry.trend(names::HTTP_REQ_DURATION).unwrap();
            let reqs = registry.counter(names::HTTP_REQS).unwrap();
            let failed = registry.rate(names::HTTP_REQ_FAILED).unwrap();
            for i in 0..SAMPLES {
                trend.record(sample(writer, i));
                reqs.inc();
                failed.record_bool(i % 10 == 0);
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let sequential: Vec<f64> = (0..WRITERS)
        .flat_map(|writer| (0..SAMPLES).map(move |i| sample(writer, i)))
        .collect();
    let expected = TrendSummary::from_samples(sequential);

    let snapshot = registry.snapshot();
    let trend = snapshot.trend(names::HTTP_REQ_DURATION).unwrap();
    assert_eq!(trend.count, (WRITERS * SAMPLES) as u64);
    assert_eq!(trend.p95, expected.p95);
    assert_eq!(trend.p99, expected.p99);
    assert_eq!(trend.med, expected.med);
    assert_eq!(trend.min, expected.min);
    assert_eq!(trend.max, expected.max);

    assert_eq!(snapshot.counter(names::HTTP_REQS), Some((WRITERS * SAMPLES) as u64));
    let rate = snapshot.rate(names::HTTP_REQ_FAILED).unwrap();
    assert!((rate - 0.1).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_yields_one_metric() {
    let registry = Arc::new(MetricsRegistry::new());
    let mut tasks = Vec::new();

    for _ in 0..32 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let name = names::tagged(names::ITERATIONS, "scenario", "browse");
            registry.register(&name, MetricKind::Counter).unwrap().record(1.0);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.counter("iterations{scenario:browse}"), Some(32));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gauge_peak_under_contention() {
    let registry = Arc::new(MetricsRegistry::new());
    let vus = registry.gauge(names::VUS).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let vus = vus.clone();
        tasks.push(tokio::spawn(async move {
            vus.add(1.0);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    for _ in 0..20 {
        vus.sub(1.0);
    }

    match registry.snapshot().get(names::VUS).unwrap() {
        stampede_metrics::MetricSummary::Gauge { value, max, .. } => {
            assert_eq!(*value, 0.0);
            assert_eq!(*max, 20.0);
        }
        other => panic!("unexpected summary {:?}", other),
    }
}
