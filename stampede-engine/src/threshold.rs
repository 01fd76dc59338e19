//! Threshold expressions and their evaluation against metric snapshots

use regex::Regex;
use serde::{Deserialize, Serialize};
use stampede_config::{Severity, ThresholdConfig};
use stampede_metrics::{MetricSummary, MetricsSnapshot};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Error type for threshold definitions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("Invalid threshold expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("Threshold metric name cannot be empty")]
    EmptyMetric,
}

/// Statistic a threshold compares
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
    Count,
    Rate,
    Value,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Avg => write!(f, "avg"),
            Aggregate::Min => write!(f, "min"),
            Aggregate::Max => write!(f, "max"),
            Aggregate::Med => write!(f, "med"),
            Aggregate::Percentile(p) => write!(f, "p({})", p),
            Aggregate::Count => write!(f, "count"),
            Aggregate::Rate => write!(f, "rate"),
            Aggregate::Value => write!(f, "value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    pub fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Lt => observed < limit,
            Comparison::Le => observed <= limit,
            Comparison::Gt => observed > limit,
            Comparison::Ge => observed >= limit,
            Comparison::Eq => observed == limit,
            Comparison::Ne => observed != limit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Comparison::Lt),
            "<=" => Ok(Comparison::Le),
            ">" => Ok(Comparison::Gt),
            ">=" => Ok(Comparison::Ge),
            "==" => Ok(Comparison::Eq),
            "!=" => Ok(Comparison::Ne),
            other => Err(format!("unknown operator '{}'", other)),
        }
    }
}

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<agg>avg|min|max|med|count|rate|value|p\(\s*(?P<pa>[0-9]+(?:\.[0-9]+)?)\s*\)|p(?P<pb>[0-9]+(?:\.[0-9]+)?))\s*(?P<op><=|>=|==|!=|<|>)\s*(?P<num>[-+]?[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?)\s*$",
        )
        .expect("threshold pattern is valid")
    })
}

/// A parsed pass/fail criterion for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub aggregate: Aggregate,
    pub comparison: Comparison,
    pub limit: f64,
    pub severity: Severity,
    pub abort_on_fail: bool,
}

impl Threshold {
    /// Parse `<aggregate> <op> <number>`, e.g. `p(95) < 2000` or `rate < 0.01`
    pub fn parse(metric: impl Into<String>, expression: &str) -> Result<Self, ThresholdError> {
        let metric = metric.into();
        if metric.trim().is_empty() {
            return Err(ThresholdError::EmptyMetric);
        }

        let invalid = |reason: &str| ThresholdError::InvalidExpression {
            expr: expression.to_string(),
            reason: reason.to_string(),
        };

        let caps = expression_pattern()
            .captures(expression)
            .ok_or_else(|| invalid("expected '<aggregate> <operator> <number>'"))?;

        let aggregate = match &caps["agg"] {
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "med" => Aggregate::Med,
            "count" => Aggregate::Count,
            "rate" => Aggregate::Rate,
            "value" => Aggregate::Value,
            _ => {
                let raw = caps
                    .name("pa")
                    .or_else(|| caps.name("pb"))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                let p: f64 = raw.parse().map_err(|_| invalid("percentile is not a number"))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(invalid("percentile must be between 0 and 100"));
                }
                Aggregate::Percentile(p)
            }
        };

        let comparison: Comparison = caps["op"].parse().map_err(|e: String| invalid(&e))?;
        let limit: f64 = caps["num"].parse().map_err(|_| invalid("limit is not a number"))?;

        Ok(Self {
            metric,
            expression: expression.trim().to_string(),
            aggregate,
            comparison,
            limit,
            severity: Severity::Error,
            abort_on_fail: false,
        })
    }

    pub fn from_config(config: &ThresholdConfig) -> Result<Self, ThresholdError> {
        Ok(Self::parse(config.metric.clone(), &config.expr)?
            .with_severity(config.severity)
            .with_abort_on_fail(config.abort_on_fail))
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_abort_on_fail(mut self, abort_on_fail: bool) -> Self {
        self.abort_on_fail = abort_on_fail;
        self
    }

    /// Observed value of the aggregate, or why it cannot be computed
    fn observe(&self, summary: &MetricSummary) -> Result<f64, String> {
        let not_applicable = || {
            Err(format!(
                "aggregate '{}' does not apply to a {} metric",
                self.aggregate,
                summary.kind()
            ))
        };

        match (summary, self.aggregate) {
            (MetricSummary::Trend(trend), Aggregate::Avg) => Ok(trend.avg),
            (MetricSummary::Trend(trend), Aggregate::Min) => Ok(trend.min),
            (MetricSummary::Trend(trend), Aggregate::Max) => Ok(trend.max),
            (MetricSummary::Trend(trend), Aggregate::Med) => Ok(trend.med),
            (MetricSummary::Trend(trend), Aggregate::Count) => Ok(trend.count as f64),
            (MetricSummary::Trend(trend), Aggregate::Percentile(p)) => trend
                .percentile(p)
                .ok_or_else(|| format!("p({}) is not available for this trend", p)),
            (MetricSummary::Counter { count, .. }, Aggregate::Count) => Ok(*count as f64),
            (MetricSummary::Counter { rate, .. }, Aggregate::Rate) => Ok(*rate),
            (MetricSummary::Rate { rate, .. }, Aggregate::Rate) => Ok(*rate),
            (MetricSummary::Rate { passes, .. }, Aggregate::Count) => Ok(*passes as f64),
            (MetricSummary::Gauge { value, .. }, Aggregate::Value) => Ok(*value),
            (MetricSummary::Gauge { min, .. }, Aggregate::Min) => Ok(*min),
            (MetricSummary::Gauge { max, .. }, Aggregate::Max) => Ok(*max),
            _ => not_applicable(),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression)
    }
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub severity: Severity,
    pub passed: bool,
    /// Value the limit was compared against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<f64>,
    /// Why the threshold failed without a comparison
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub abort_on_fail: bool,
}

impl ThresholdResult {
    /// A failed `error` threshold fails the run; a failed `warning` does not
    pub fn fails_run(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }
}

/// Evaluate every threshold against a snapshot. Metrics are only read.
pub fn evaluate(snapshot: &MetricsSnapshot, thresholds: &[Threshold]) -> Vec<ThresholdResult> {
    thresholds
        .iter()
        .map(|threshold| {
            let observed = match snapshot.get(&threshold.metric) {
                Some(summary) if summary.has_data() => threshold.observe(summary),
                _ => Err("no data".to_string()),
            };

            let (passed, observed, reason) = match observed {
                Ok(value) => (threshold.comparison.holds(value, threshold.limit), Some(value), None),
                Err(reason) => (false, None, Some(reason)),
            };

            ThresholdResult {
                metric: threshold.metric.clone(),
                expression: threshold.expression.clone(),
                severity: threshold.severity,
                passed,
                observed,
                reason,
                abort_on_fail: threshold.abort_on_fail,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_metrics::{names, MetricsRegistry};

    fn snapshot_with_duration(value: f64) -> MetricsSnapshot {
        let registry = MetricsRegistry::new();
        let trend = registry.trend(names::HTTP_REQ_DURATION).unwrap();
        for _ in 0..100 {
            trend.record(value);
        }
        registry.snapshot()
    }

    #[test]
    fn test_parse_expressions() {
        let t = Threshold::parse("http_req_duration", "p(95) < 2000").unwrap();
        assert_eq!(t.aggregate, Aggregate::Percentile(95.0));
        assert_eq!(t.comparison, Comparison::Lt);
        assert_eq!(t.limit, 2000.0);

        let t = Threshold::parse("http_req_duration", "p99.9<=1500").unwrap();
        assert_eq!(t.aggregate, Aggregate::Percentile(99.9));
        assert_eq!(t.comparison, Comparison::Le);

        let t = Threshold::parse("http_req_failed", "  rate != 0.5 ").unwrap();
        assert_eq!(t.aggregate, Aggregate::Rate);
        assert_eq!(t.comparison, Comparison::Ne);
        assert_eq!(t.expression, "rate != 0.5");

        assert_eq!(
            Threshold::parse("vus", "value >= -1").unwrap().limit,
            -1.0
        );
    }

    #[test]
    fn test_parse_errors() {
        for expr in ["", "p95", "p(95) < ", "p(101) < 5", "median < 3", "avg => 1", "avg < abc"] {
            assert!(
                matches!(
                    Threshold::parse("m", expr),
                    Err(ThresholdError::InvalidExpression { .. })
                ),
                "accepted '{}'",
                expr
            );
        }
        assert_eq!(Threshold::parse(" ", "avg < 1").unwrap_err(), ThresholdError::EmptyMetric);
    }

    #[test]
    fn test_p95_against_limit() {
        let threshold = Threshold::parse("http_req_duration", "p95 < 2000").unwrap();

        let results = evaluate(&snapshot_with_duration(1800.0), std::slice::from_ref(&threshold));
        assert!(results[0].passed);
        assert_eq!(results[0].observed, Some(1800.0));

        let results = evaluate(&snapshot_with_duration(2200.0), &[threshold]);
        assert!(!results[0].passed);
        assert!(results[0].fails_run());
    }

    #[test]
    fn test_no_data() {
        let registry = MetricsRegistry::new();
        registry.trend(names::HTTP_REQ_DURATION).unwrap();
        let snapshot = registry.snapshot();

        let thresholds = [
            Threshold::parse(names::HTTP_REQ_DURATION, "p(95) < 2000").unwrap(),
            Threshold::parse("checkout_latency", "avg < 100").unwrap(),
        ];
        for result in evaluate(&snapshot, &thresholds) {
            assert!(!result.passed);
            assert_eq!(result.reason.as_deref(), Some("no data"));
            assert_eq!(result.observed, None);
        }
    }

    #[test]
    fn test_aggregate_must_fit_kind() {
        let registry = MetricsRegistry::new();
        registry.counter(names::HTTP_REQS).unwrap().add(10);
        let snapshot = registry.snapshot();

        let results = evaluate(
            &snapshot,
            &[
                Threshold::parse(names::HTTP_REQS, "count >= 10").unwrap(),
                Threshold::parse(names::HTTP_REQS, "p(95) < 1").unwrap(),
            ],
        );
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert!(results[1].reason.as_deref().unwrap().contains("does not apply to a counter"));
    }

    #[test]
    fn test_warning_does_not_fail_run() {
        let threshold = Threshold::parse("http_req_duration", "max < 10")
            .unwrap()
            .with_severity(Severity::Warning);
        let results = evaluate(&snapshot_with_duration(50.0), &[threshold]);
        assert!(!results[0].passed);
        assert!(!results[0].fails_run());
    }

    #[test]
    fn test_from_config() {
        let mut config = ThresholdConfig::new("http_req_failed", "rate < 0.01");
        config.abort_on_fail = true;
        let threshold = Threshold::from_config(&config).unwrap();
        assert!(threshold.abort_on_fail);
        assert_eq!(threshold.severity, Severity::Error);
        assert_eq!(threshold.to_string(), "http_req_failed: rate < 0.01");
    }
}
