//! Point-in-time metric summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Percentile of an ascending sorted slice using linear interpolation
/// between the closest ranks, `rank = p / 100 * (n - 1)`.
///
/// Returns 0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Aggregates of a trend's samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,

    /// Sorted samples, kept in memory for arbitrary percentile queries
    #[serde(skip)]
    samples: Arc<Vec<f64>>,
}

impl TrendSummary {
    pub fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(f64::total_cmp);

        let count = samples.len();
        let sum: f64 = samples.iter().sum();
        Self {
            count: count as u64,
            min: samples[0],
            max: samples[count - 1],
            avg: sum / count as f64,
            med: percentile(&samples, 50.0),
            p90: percentile(&samples, 90.0),
            p95: percentile(&samples, 95.0),
            p99: percentile(&samples, 99.0),
            samples: Arc::new(samples),
        }
    }

    /// Percentile `p` in `[0, 100]`.
    ///
    /// Computed from the samples when they are available; a summary that was
    /// deserialized only knows the precomputed med/p90/p95/p99.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if !self.samples.is_empty() {
            return Some(percentile(&self.samples, p));
        }
        if self.count == 0 {
            return None;
        }
        match p {
            p if p == 50.0 => Some(self.med),
            p if p == 90.0 => Some(self.p90),
            p if p == 95.0 => Some(self.p95),
            p if p == 99.0 => Some(self.p99),
            p if p == 0.0 => Some(self.min),
            p if p == 100.0 => Some(self.max),
            _ => None,
        }
    }
}

/// Summary of one metric at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSummary {
    /// Total and per-second rate over the registry lifetime
    Counter { count: u64, rate: f64 },
    /// `passes` true outcomes out of `passes + fails`
    Rate { passes: u64, fails: u64, rate: f64 },
    Trend(TrendSummary),
    Gauge {
        value: f64,
        min: f64,
        max: f64,
        written: bool,
    },
}

impl MetricSummary {
    /// Whether the metric saw any write. A counter always counts as observed,
    /// zero is a meaningful total.
    pub fn has_data(&self) -> bool {
        match self {
            MetricSummary::Counter { .. } => true,
            MetricSummary::Rate { passes, fails, .. } => passes + fails > 0,
            MetricSummary::Trend(trend) => trend.count > 0,
            MetricSummary::Gauge { written, .. } => *written,
        }
    }

    pub fn kind(&self) -> crate::MetricKind {
        match self {
            MetricSummary::Counter { .. } => crate::MetricKind::Counter,
            MetricSummary::Rate { .. } => crate::MetricKind::Rate,
            MetricSummary::Trend(_) => crate::MetricKind::Trend,
            MetricSummary::Gauge { .. } => crate::MetricKind::Gauge,
        }
    }
}

/// Every registered metric summarised at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub taken_at: DateTime<Utc>,

    /// Time since the registry was created
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,

    pub metrics: BTreeMap<String, MetricSummary>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.metrics.get(name)? {
            MetricSummary::Counter { count, .. } => Some(*count),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        match self.metrics.get(name)? {
            MetricSummary::Rate { rate, .. } => Some(*rate),
            _ => None,
        }
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match self.metrics.get(name)? {
            MetricSummary::Trend(trend) => Some(trend),
            _ => None,
        }
    }

    /// Tagged variants of `base`, e.g. every `iterations{scenario:*}`
    pub fn tagged<'a>(&'a self, base: &'a str) -> impl Iterator<Item = (&'a str, &'a MetricSummary)> + 'a {
        self.metrics
            .iter()
            .filter(move |(name, _)| {
                crate::names::split_tagged(name).is_some_and(|(b, _, _)| b == base)
            })
            .map(|(name, summary)| (name.as_str(), summary))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 10.0);
        assert!((percentile(&sorted, 50.0) - 5.5).abs() < 1e-9);
        assert!((percentile(&sorted, 90.0) - 9.1).abs() < 1e-9);
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[42.0], 95.0), 42.0);
    }

    #[test]
    fn test_trend_summary() {
        let summary = TrendSummary::from_samples(vec![30.0, 10.0, 20.0, 40.0]);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 40.0);
        assert_eq!(summary.avg, 25.0);
        assert_eq!(summary.med, 25.0);
        assert_eq!(summary.percentile(75.0), Some(32.5));
    }

    #[test]
    fn test_trend_summary_order_independent() {
        let ascending: Vec<f64> = (0..1000).map(f64::from).collect();
        let mut shuffled = ascending.clone();
        shuffled.reverse();
        shuffled.swap(10, 500);
        assert_eq!(
            TrendSummary::from_samples(ascending),
            TrendSummary::from_samples(shuffled)
        );
    }

    #[test]
    fn test_deserialized_trend_keeps_fixed_percentiles() {
        let summary = MetricSummary::Trend(TrendSummary::from_samples(vec![1.0, 2.0, 3.0]));
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"type\":\"trend\""));

        let MetricSummary::Trend(parsed) = serde_json::from_str(&json).unwrap() else {
            panic!("expected a trend");
        };
        assert_eq!(parsed.percentile(50.0), Some(2.0));
        assert_eq!(parsed.percentile(75.0), None);
    }

    #[test]
    fn test_has_data() {
        assert!(MetricSummary::Counter { count: 0, rate: 0.0 }.has_data());
        assert!(!MetricSummary::Rate { passes: 0, fails: 0, rate: 0.0 }.has_data());
        assert!(!MetricSummary::Trend(TrendSummary::default()).has_data());
    }
}
