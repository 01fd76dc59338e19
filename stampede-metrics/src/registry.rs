//! Name to metric registry

use crate::error::{MetricsError, MetricsResult};
use crate::metric::{Counter, Gauge, MetricHandle, MetricKind, Rate, Trend};
use crate::summary::MetricsSnapshot;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::debug;

/// Registry shared by every virtual user of a run.
///
/// The map lock is only taken to register a name or to snapshot; writes go
/// through the returned handles.
#[derive(Debug)]
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, MetricHandle>>,
    created: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            created: Instant::now(),
        }
    }

    /// Register `name` as `kind`, or return the existing handle when the name
    /// is already registered with the same kind
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricsResult<MetricHandle> {
        if name.trim().is_empty() {
            return Err(MetricsError::EmptyName);
        }

        if let Some(existing) = self.metrics.read().get(name) {
            return Self::check_kind(name, existing, kind);
        }

        let mut metrics = self.metrics.write();
        if let Some(existing) = metrics.get(name) {
            return Self::check_kind(name, existing, kind);
        }

        debug!("Registering {} metric '{}'", kind, name);
        let handle = MetricHandle::new(kind);
        metrics.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    fn check_kind(name: &str, existing: &MetricHandle, kind: MetricKind) -> MetricsResult<MetricHandle> {
        if existing.kind() == kind {
            Ok(existing.clone())
        } else {
            Err(MetricsError::KindMismatch {
                name: name.to_string(),
                registered: existing.kind(),
                requested: kind,
            })
        }
    }

    pub fn counter(&self, name: &str) -> MetricsResult<Counter> {
        match self.register(name, MetricKind::Counter)? {
            MetricHandle::Counter(counter) => Ok(counter),
            other => Err(Self::mismatch(name, &other, MetricKind::Counter)),
        }
    }

    pub fn rate(&self, name: &str) -> MetricsResult<Rate> {
        match self.register(name, MetricKind::Rate)? {
            MetricHandle::Rate(rate) => Ok(rate),
            other => Err(Self::mismatch(name, &other, MetricKind::Rate)),
        }
    }

    pub fn trend(&self, name: &str) -> MetricsResult<Trend> {
        match self.register(name, MetricKind::Trend)? {
            MetricHandle::Trend(trend) => Ok(trend),
            other => Err(Self::mismatch(name, &other, MetricKind::Trend)),
        }
    }

    pub fn gauge(&self, name: &str) -> MetricsResult<Gauge> {
        match self.register(name, MetricKind::Gauge)? {
            MetricHandle::Gauge(gauge) => Ok(gauge),
            other => Err(Self::mismatch(name, &other, MetricKind::Gauge)),
        }
    }

    fn mismatch(name: &str, handle: &MetricHandle, requested: MetricKind) -> MetricsError {
        MetricsError::KindMismatch {
            name: name.to_string(),
            registered: handle.kind(),
            requested,
        }
    }

    /// Record a value through a handle obtained from this registry
    pub fn record(&self, handle: &MetricHandle, value: f64) {
        handle.record(value);
    }

    /// Kind of a registered metric
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.metrics.read().get(name).map(MetricHandle::kind)
    }

    /// Summarise every registered metric.
    ///
    /// Handles are cloned under the read lock; samples are copied and sorted
    /// after it is released.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let handles: Vec<(String, MetricHandle)> = self
            .metrics
            .read()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();

        let elapsed = self.created.elapsed();
        let metrics: BTreeMap<_, _> = handles
            .into_iter()
            .map(|(name, handle)| {
                let summary = handle.summarize(elapsed);
                (name, summary)
            })
            .collect();

        MetricsSnapshot {
            taken_at: Utc::now(),
            elapsed,
            metrics,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
