//! Metrics registry for Stampede load runs
//!
//! Virtual users write to metrics from many tasks at once while the
//! orchestrator and threshold checks read point-in-time snapshots. Each
//! metric has a kind fixed at registration:
//!
//! - [`Counter`]: monotonic total
//! - [`Rate`]: fraction of `true` outcomes
//! - [`Trend`]: sample distribution summarised by percentiles
//! - [`Gauge`]: last written value with min/max tracking
//!
//! Handles are cheap to clone and write without touching the registry map.

pub mod error;
pub mod metric;
pub mod names;
pub mod registry;
pub mod summary;

pub use error::{MetricsError, MetricsResult};
pub use metric::{Counter, Gauge, MetricHandle, MetricKind, Rate, Trend};
pub use registry::MetricsRegistry;
pub use summary::{percentile, MetricSummary, MetricsSnapshot, TrendSummary};
