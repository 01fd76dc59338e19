//! Metric kinds and their write handles

use crate::summary::{MetricSummary, TrendSummary};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Number of independent sample buffers behind a trend
const TREND_SHARDS: usize = 16;

/// The kind a metric is registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Rate => write!(f, "rate"),
            MetricKind::Trend => write!(f, "trend"),
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

/// Monotonic total
#[derive(Debug, Clone, Default)]
pub struct Counter {
    total: Arc<AtomicU64>,
}

impl Counter {
    pub fn add(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn summarize(&self, elapsed: Duration) -> MetricSummary {
        let count = self.get();
        let secs = elapsed.as_secs_f64();
        MetricSummary::Counter {
            count,
            rate: if secs > 0.0 { count as f64 / secs } else { 0.0 },
        }
    }
}

/// Outcomes one rate can hold before further records are dropped
const RATE_CAPACITY: u64 = u32::MAX as u64;

/// Fraction of boolean outcomes that were `true`.
///
/// Passes live in the high half of one word and the total in the low half,
/// so a reader always sees a pair that existed.
#[derive(Debug, Clone, Default)]
pub struct Rate {
    packed: Arc<AtomicU64>,
}

impl Rate {
    pub fn record_bool(&self, value: bool) {
        let delta = if value { (1 << 32) | 1 } else { 1 };
        let recorded = self
            .packed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |packed| {
                ((packed & RATE_CAPACITY) < RATE_CAPACITY).then_some(packed + delta)
            });
        if recorded.is_err() {
            tracing::debug!("Rate is full, dropping outcome");
        }
    }

    fn summarize(&self) -> MetricSummary {
        let packed = self.packed.load(Ordering::Acquire);
        let passes = packed >> 32;
        let total = packed & RATE_CAPACITY;
        MetricSummary::Rate {
            passes,
            fails: total - passes,
            rate: if total > 0 { passes as f64 / total as f64 } else { 0.0 },
        }
    }
}

/// Distribution of samples, kept in sharded buffers so concurrent writers
/// rarely contend on the same lock
#[derive(Debug, Clone)]
pub struct Trend {
    inner: Arc<TrendInner>,
}

#[derive(Debug)]
struct TrendInner {
    shards: Box<[Mutex<Vec<f64>>]>,
    next: AtomicUsize,
}

impl Default for Trend {
    fn default() -> Self {
        let shards = (0..TREND_SHARDS).map(|_| Mutex::new(Vec::new())).collect();
        Self {
            inner: Arc::new(TrendInner {
                shards,
                next: AtomicUsize::new(0),
            }),
        }
    }
}

impl Trend {
    /// Record one sample. Non-finite values are ignored.
    pub fn record(&self, value: f64) {
        if !value.is_finite() {
            tracing::debug!("Ignoring non-finite trend sample {}", value);
            return;
        }
        let idx = self.inner.next.fetch_add(1, Ordering::Relaxed) % self.inner.shards.len();
        self.inner.shards[idx].lock().push(value);
    }

    /// Record a duration in milliseconds
    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_secs_f64() * 1000.0);
    }

    /// Number of samples recorded so far
    pub fn count(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    fn summarize(&self) -> MetricSummary {
        let mut samples = Vec::new();
        for shard in self.inner.shards.iter() {
            samples.extend_from_slice(&shard.lock());
        }
        MetricSummary::Trend(TrendSummary::from_samples(samples))
    }
}

/// Last written value, tracking the lowest and highest value ever held
#[derive(Debug, Clone)]
pub struct Gauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug)]
struct GaugeInner {
    value: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
    written: AtomicBool,
}

impl Default for Gauge {
    fn default() -> Self {
        Self {
            inner: Arc::new(GaugeInner {
                value: AtomicU64::new(0f64.to_bits()),
                min: AtomicU64::new(f64::INFINITY.to_bits()),
                max: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
                written: AtomicBool::new(false),
            }),
        }
    }
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.inner.value.store(value.to_bits(), Ordering::Relaxed);
        self.observe(value);
    }

    pub fn add(&self, delta: f64) {
        let previous = fetch_update_f64(&self.inner.value, |current| Some(current + delta));
        self.observe(previous + delta);
    }

    pub fn sub(&self, delta: f64) {
        self.add(-delta);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.value.load(Ordering::Relaxed))
    }

    fn observe(&self, value: f64) {
        fetch_update_f64(&self.inner.min, |min| (value < min).then_some(value));
        fetch_update_f64(&self.inner.max, |max| (value > max).then_some(value));
        self.inner.written.store(true, Ordering::Release);
    }

    fn summarize(&self) -> MetricSummary {
        if !self.inner.written.load(Ordering::Acquire) {
            return MetricSummary::Gauge {
                value: 0.0,
                min: 0.0,
                max: 0.0,
                written: false,
            };
        }
        // A writer stores the value before widening min and max
        let value = self.get();
        let min = f64::from_bits(self.inner.min.load(Ordering::Acquire));
        let max = f64::from_bits(self.inner.max.load(Ordering::Acquire));
        MetricSummary::Gauge {
            value,
            min: min.min(value),
            max: max.max(value),
            written: true,
        }
    }
}

/// CAS loop over an `f64` stored as bits; returns the previous value
fn fetch_update_f64(cell: &AtomicU64, mut f: impl FnMut(f64) -> Option<f64>) -> f64 {
    let result = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
        f(f64::from_bits(bits)).map(f64::to_bits)
    });
    match result {
        Ok(bits) | Err(bits) => f64::from_bits(bits),
    }
}

/// A registered metric of any kind
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Counter),
    Rate(Rate),
    Trend(Trend),
    Gauge(Gauge),
}

impl MetricHandle {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => MetricHandle::Counter(Counter::default()),
            MetricKind::Rate => MetricHandle::Rate(Rate::default()),
            MetricKind::Trend => MetricHandle::Trend(Trend::default()),
            MetricKind::Gauge => MetricHandle::Gauge(Gauge::default()),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Rate(_) => MetricKind::Rate,
            MetricHandle::Trend(_) => MetricKind::Trend,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Record a value the way the metric kind interprets it: counters add it,
    /// rates treat non-zero as `true`, trends sample it and gauges set it
    pub fn record(&self, value: f64) {
        match self {
            MetricHandle::Counter(counter) => {
                if value.is_finite() && value >= 0.0 {
                    counter.add(value as u64);
                } else {
                    tracing::debug!("Counter cannot record {}", value);
                }
            }
            MetricHandle::Rate(rate) => rate.record_bool(value != 0.0),
            MetricHandle::Trend(trend) => trend.record(value),
            MetricHandle::Gauge(gauge) => gauge.set(value),
        }
    }

    pub(crate) fn summarize(&self, elapsed: Duration) -> MetricSummary {
        match self {
            MetricHandle::Counter(counter) => counter.summarize(elapsed),
            MetricHandle::Rate(rate) => rate.summarize(),
            MetricHandle::Trend(trend) => trend.summarize(),
            MetricHandle::Gauge(gauge) => gauge.summarize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::default();
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);
        assert!(matches!(
            counter.summarize(Duration::from_secs(5)),
            MetricSummary::Counter { count: 5, rate } if (rate - 1.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_rate() {
        let rate = Rate::default();
        for i in 0..10 {
            rate.record_bool(i < 3);
        }
        match rate.summarize() {
            MetricSummary::Rate { passes, fails, rate } => {
                assert_eq!(passes, 3);
                assert_eq!(fails, 7);
                assert!((rate - 0.3).abs() < 1e-9);
            }
            other => panic!("unexpected summary {:?}", other),
        }
    }

    #[test]
    fn test_rate_snapshot_is_never_torn() {
        let rate = Rate::default();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200_000 {
                    rate.record_bool(i % 2 == 0);
                }
                done.store(true, Ordering::Release);
            });

            // Alternating outcomes: every real state has ceil(total / 2) passes
            while !done.load(Ordering::Acquire) {
                let MetricSummary::Rate { passes, fails, .. } = rate.summarize() else {
                    panic!("expected a rate summary");
                };
                assert_eq!(passes, (passes + fails).div_ceil(2));
            }
        });

        assert!(matches!(
            rate.summarize(),
            MetricSummary::Rate { passes: 100_000, fails: 100_000, .. }
        ));
    }

    #[test]
    fn test_full_rate_drops_outcomes() {
        let rate = Rate::default();
        rate.packed.store((5 << 32) | RATE_CAPACITY, Ordering::Relaxed);
        rate.record_bool(true);
        assert!(matches!(
            rate.summarize(),
            MetricSummary::Rate { passes: 5, fails, .. } if fails == RATE_CAPACITY - 5
        ));
    }

    #[test]
    fn test_gauge_snapshot_brackets_value() {
        let gauge = Gauge::default();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..100_000 {
                    gauge.add(1.0);
                }
                for _ in 0..100_000 {
                    gauge.sub(1.0);
                }
                done.store(true, Ordering::Release);
            });

            while !done.load(Ordering::Acquire) {
                if let MetricSummary::Gauge { value, min, max, written: true } = gauge.summarize() {
                    assert!(min <= value && value <= max, "{} not in [{}, {}]", value, min, max);
                }
            }
        });
    }

    #[test]
    fn test_gauge_tracks_min_and_max() {
        let gauge = Gauge::default();
        assert!(!gauge.summarize().has_data());

        gauge.add(1.0);
        gauge.add(1.0);
        gauge.add(1.0);
        gauge.sub(1.0);
        gauge.sub(1.0);

        match gauge.summarize() {
            MetricSummary::Gauge { value, min, max, written } => {
                assert!(written);
                assert_eq!(value, 1.0);
                assert_eq!(min, 1.0);
                assert_eq!(max, 3.0);
            }
            other => panic!("unexpected summary {:?}", other),
        }

        gauge.set(-2.5);
        assert_eq!(gauge.get(), -2.5);
    }

    #[test]
    fn test_trend_ignores_non_finite() {
        let trend = Trend::default();
        trend.record(f64::NAN);
        trend.record(f64::INFINITY);
        trend.record(12.0);
        trend.record_duration(Duration::from_millis(8));
        assert_eq!(trend.count(), 2);
    }

    #[test]
    fn test_generic_record_by_kind() {
        let counter = MetricHandle::new(MetricKind::Counter);
        counter.record(2.0);
        counter.record(-1.0);
        let rate = MetricHandle::new(MetricKind::Rate);
        rate.record(1.0);
        rate.record(0.0);

        assert!(matches!(
            counter.summarize(Duration::ZERO),
            MetricSummary::Counter { count: 2, .. }
        ));
        assert!(matches!(
            rate.summarize(Duration::ZERO),
            MetricSummary::Rate { passes: 1, fails: 1, .. }
        ));
    }
}
