//! Request driver against a stub server

use serde_json::json;
use stampede_http::{DriverConfig, HttpError, RequestDriver, RequestSpec};
use stampede_metrics::{names, MetricsRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn driver_for(server: &MockServer) -> (RequestDriver, Arc<MetricsRegistry>) {
    let registry = Arc::new(MetricsRegistry::new());
    let config = DriverConfig::default()
        .with_base_url(server.uri())
        .with_default_timeout(Duration::from_secs(5));
    let driver = RequestDriver::new(config, registry.clone()).unwrap();
    (driver, registry)
}

#[tokio::test]
async fn test_successful_request_is_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(header("X-Client", "stampede"))
        .and(body_json(json!({"email": "a@b.c"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t-1"})))
        .mount(&server)
        .await;

    let (driver, registry) = driver_for(&server);
    let spec = RequestSpec::post_json("/api/auth/login", json!({"email": "a@b.c"}))
        .header("X-Client", "stampede")
        .tag("login");

    let result = driver.execute(spec, &CancellationToken::new()).await;

    assert_eq!(result.status, 200);
    assert!(result.is_success());
    assert!(!result.dropped);
    assert_eq!(result.json_field("token"), Some(json!("t-1")));

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.counter(names::HTTP_REQS), Some(1));
    assert_eq!(snapshot.counter("http_reqs{name:login}"), Some(1));
    assert_eq!(snapshot.trend("http_req_duration{name:login}").unwrap().count, 1);
    assert_eq!(snapshot.rate(names::HTTP_REQ_FAILED), Some(0.0));
    assert_eq!(snapshot.counter(names::DROPPED_REQUESTS), Some(0));
    assert_eq!(snapshot.counter(names::HEURISTIC_CRASH_SIGNALS), Some(0));
}

#[tokio::test]
async fn test_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(path("/overloaded"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (driver, registry) = driver_for(&server);
    let cancel = CancellationToken::new();

    let missing = driver.execute(RequestSpec::get("/missing"), &cancel).await;
    assert_eq!(missing.status, 404);
    assert!(matches!(missing.error(), Some(HttpError::Status { status: 404, .. })));
    assert!(missing.error_for_status().is_err());

    let overloaded = driver.execute(RequestSpec::get("/overloaded"), &cancel).await;
    assert_eq!(overloaded.status, 503);

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.rate(names::HTTP_REQ_FAILED), Some(1.0));
    assert_eq!(snapshot.counter(names::HEURISTIC_CRASH_SIGNALS), Some(1));
    assert_eq!(snapshot.counter(names::DROPPED_REQUESTS), Some(0));
}

#[tokio::test]
async fn test_timeout_counts_as_dropped() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let (driver, registry) = driver_for(&server);
    let spec = RequestSpec::get("/slow").timeout(Duration::from_millis(100));
    let result = driver.execute(spec, &CancellationToken::new()).await;

    assert_eq!(result.status, 0);
    assert!(result.dropped);
    assert!(matches!(result.error(), Some(HttpError::Timeout(_))));

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.counter(names::HTTP_REQS), Some(1));
    assert_eq!(snapshot.counter(names::DROPPED_REQUESTS), Some(1));
    assert_eq!(snapshot.counter(names::HEURISTIC_CRASH_SIGNALS), Some(1));
    assert_eq!(snapshot.rate(names::HTTP_REQ_FAILED), Some(1.0));
}

#[tokio::test]
async fn test_cancelled_request_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let (driver, registry) = driver_for(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = driver.execute(RequestSpec::get("/slow").tag("slow"), &cancel).await;

    assert_eq!(result.error(), Some(&HttpError::Cancelled));
    assert!(result.duration < Duration::from_secs(1));

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.counter(names::HTTP_REQS), Some(0));
    assert_eq!(snapshot.trend(names::HTTP_REQ_DURATION).unwrap().count, 0);
    assert!(snapshot.get("http_reqs{name:slow}").is_none());
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let registry = Arc::new(MetricsRegistry::new());
    // Port 9 (discard) is closed on any sane test host
    let config = DriverConfig::default().with_base_url("http://127.0.0.1:9");
    let driver = RequestDriver::new(config, registry.clone()).unwrap();

    let result = driver.execute(RequestSpec::get("/"), &CancellationToken::new()).await;

    assert_eq!(result.status, 0);
    assert!(result.dropped);
    assert!(matches!(result.error(), Some(HttpError::Network(_))));
    assert_eq!(registry.snapshot().counter(names::DROPPED_REQUESTS), Some(1));
}
