//! Request driver implementation

use crate::config::DriverConfig;
use crate::errors::HttpError;
use crate::types::{RequestBody, RequestResult, RequestSpec};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use parking_lot::RwLock;
use stampede_metrics::{names, Counter, MetricsError, MetricsRegistry, Rate, Trend};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Anything that can execute a [`RequestSpec`] on behalf of a virtual user
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Run the request. Never fails: errors are carried in the result.
    async fn execute(&self, spec: RequestSpec, cancel: &CancellationToken) -> RequestResult;
}

/// Per-tag request metrics, resolved on the first request carrying the tag
#[derive(Debug)]
struct TaggedMetrics {
    reqs: Counter,
    duration: Trend,
    failed: Rate,
}

impl TaggedMetrics {
    fn register(registry: &MetricsRegistry, tag: &str) -> Result<Self, MetricsError> {
        Ok(Self {
            reqs: registry.counter(&names::tagged(names::HTTP_REQS, "name", tag))?,
            duration: registry.trend(&names::tagged(names::HTTP_REQ_DURATION, "name", tag))?,
            failed: registry.rate(&names::tagged(names::HTTP_REQ_FAILED, "name", tag))?,
        })
    }
}

/// Handles of the unfiltered request metrics, registered once
#[derive(Debug)]
struct RequestMetrics {
    registry: Arc<MetricsRegistry>,
    reqs: Counter,
    duration: Trend,
    failed: Rate,
    dropped: Counter,
    crash_signals: Counter,
    /// Tag handles, so repeated tags never go back to the registry map
    tagged: RwLock<HashMap<String, Arc<TaggedMetrics>>>,
}

impl RequestMetrics {
    fn register(registry: Arc<MetricsRegistry>) -> Result<Self, HttpError> {
        Ok(Self {
            reqs: registry.counter(names::HTTP_REQS)?,
            duration: registry.trend(names::HTTP_REQ_DURATION)?,
            failed: registry.rate(names::HTTP_REQ_FAILED)?,
            dropped: registry.counter(names::DROPPED_REQUESTS)?,
            crash_signals: registry.counter(names::HEURISTIC_CRASH_SIGNALS)?,
            tagged: RwLock::new(HashMap::new()),
            registry,
        })
    }

    fn record(&self, result: &RequestResult) {
        let failed = result.is_failure();

        self.reqs.inc();
        self.duration.record_duration(result.duration);
        self.failed.record_bool(failed);
        if result.dropped {
            self.dropped.inc();
        }
        if result.status == 0 || result.status == 503 {
            self.crash_signals.inc();
        }

        if let Some(ref tag) = result.tag {
            match self.tagged(tag) {
                Ok(metrics) => {
                    metrics.reqs.inc();
                    metrics.duration.record_duration(result.duration);
                    metrics.failed.record_bool(failed);
                }
                Err(e) => warn!("Skipping tagged metrics for '{}': {}", tag, e),
            }
        }
    }

    fn tagged(&self, tag: &str) -> Result<Arc<TaggedMetrics>, MetricsError> {
        if let Some(metrics) = self.tagged.read().get(tag) {
            return Ok(metrics.clone());
        }

        let mut cache = self.tagged.write();
        if let Some(metrics) = cache.get(tag) {
            return Ok(metrics.clone());
        }
        let metrics = Arc::new(TaggedMetrics::register(&self.registry, tag)?);
        cache.insert(tag.to_string(), metrics.clone());
        Ok(metrics)
    }
}

/// Shared HTTP client that times requests and records them as metrics
#[derive(Debug)]
pub struct RequestDriver {
    client: Client,
    base_url: Option<Url>,
    default_timeout: Duration,
    metrics: RequestMetrics,
}

impl RequestDriver {
    /// Build the client once; every virtual user shares it and its pool
    pub fn new(config: DriverConfig, registry: Arc<MetricsRegistry>) -> Result<Self, HttpError> {
        debug!(
            "Creating request driver with {}s default timeout",
            config.default_timeout.as_secs()
        );

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HttpError::ConfigError(e.to_string()))?;

        let base_url = config
            .base_url
            .as_deref()
            .map(|base| Url::parse(base).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", base, e))))
            .transpose()?;

        Ok(Self {
            client,
            base_url,
            default_timeout: config.default_timeout,
            metrics: RequestMetrics::register(registry)?,
        })
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL
    pub fn resolve_url(&self, target: &str) -> Result<Url, HttpError> {
        if let Ok(url) = Url::parse(target) {
            return Ok(url);
        }
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| HttpError::InvalidUrl(format!("{} is relative and no base URL is set", target)))?;
        base.join(target)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", target, e)))
    }

    fn build_request(&self, spec: &RequestSpec, url: Url) -> Result<reqwest::RequestBuilder, HttpError> {
        let mut header_map = HeaderMap::new();
        for (key, value) in &spec.headers {
            let name = HeaderName::from_str(key).map_err(|_| HttpError::InvalidHeaderName(key.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeaderValue(key.clone()))?;
            header_map.insert(name, value);
        }

        let mut request = self
            .client
            .request(reqwest::Method::from(spec.method), url)
            .headers(header_map);

        match spec.body {
            Some(RequestBody::Json(ref body)) => request = request.json(body),
            Some(RequestBody::Text(ref body)) => {
                if !spec.headers.keys().any(|k| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str())) {
                    request = request.header(CONTENT_TYPE, "text/plain");
                }
                request = request.body(body.clone());
            }
            None => {}
        }

        Ok(request)
    }

    async fn send(
        request: reqwest::RequestBuilder,
    ) -> Result<(u16, HashMap<String, String>, String), reqwest::Error> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;
        Ok((status, headers, body))
    }

    /// Execute a request under its timeout and the caller's cancellation token.
    ///
    /// A cancelled request is discarded: nothing is recorded for it.
    pub async fn execute(&self, spec: RequestSpec, cancel: &CancellationToken) -> RequestResult {
        let url = match self.resolve_url(&spec.url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Not sending request: {}", e);
                return RequestResult::failed(&spec, spec.url.clone(), e, Duration::ZERO);
            }
        };
        let url_string = url.to_string();

        let request = match self.build_request(&spec, url) {
            Ok(request) => request,
            Err(e) => {
                warn!("Not sending request to {}: {}", url_string, e);
                return RequestResult::failed(&spec, url_string, e, Duration::ZERO);
            }
        };

        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        let timestamp = Utc::now();
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request to {} cancelled, discarding", url_string);
                return RequestResult::failed(&spec, url_string, HttpError::Cancelled, started.elapsed());
            }
            outcome = tokio::time::timeout(timeout, Self::send(request)) => outcome,
        };
        let duration = started.elapsed();

        let result = match outcome {
            Ok(Ok((status, headers, body))) => {
                let error = (status >= 400).then(|| HttpError::Status {
                    status,
                    url: url_string.clone(),
                });
                RequestResult {
                    tag: spec.tag,
                    method: spec.method,
                    url: url_string,
                    status,
                    duration,
                    timestamp,
                    headers,
                    body,
                    dropped: duration >= timeout,
                    error,
                }
            }
            Ok(Err(e)) => {
                let error = if e.is_timeout() {
                    HttpError::Timeout(timeout)
                } else {
                    HttpError::Network(e.to_string())
                };
                let mut result = RequestResult::failed(&spec, url_string, error, duration);
                result.timestamp = timestamp;
                result
            }
            Err(_) => {
                let mut result = RequestResult::failed(&spec, url_string, HttpError::Timeout(timeout), duration);
                result.timestamp = timestamp;
                result
            }
        };

        debug!(
            "{} {} -> {} in {:?}",
            result.method, result.url, result.status, result.duration
        );
        self.metrics.record(&result);
        result
    }
}

#[async_trait::async_trait]
impl HttpClient for RequestDriver {
    async fn execute(&self, spec: RequestSpec, cancel: &CancellationToken) -> RequestResult {
        RequestDriver::execute(self, spec, cancel).await
    }
}
