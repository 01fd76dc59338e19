//! Human readable end-of-run summary

use colored::*;
use stampede_config::Severity;
use stampede_engine::{RunResult, ThresholdResult};
use stampede_metrics::{MetricSummary, TrendSummary};
use std::fmt::Write;

/// Width metric names are padded to with dots
const NAME_WIDTH: usize = 32;

/// Render the summary shown at the end of a run
pub fn render_summary(result: &RunResult) -> String {
    let mut out = String::new();

    let peak: u64 = result.schedulers.iter().map(|s| s.peak_vus).sum();
    let iterations: u64 = result.schedulers.iter().map(|s| s.iterations).sum();
    let errors: u64 = result.schedulers.iter().map(|s| s.iteration_errors).sum();

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  {} {:.1}s, {} peak VUs, {} iterations ({} failed)",
        "duration:".bright_cyan().bold(),
        result.total_duration.as_secs_f64(),
        peak,
        iterations,
        errors
    );
    for scheduler in &result.schedulers {
        let _ = writeln!(
            out,
            "    {}: {} VUs started, {} killed, peak {}",
            scheduler.name, scheduler.vus_started, scheduler.vus_killed, scheduler.peak_vus
        );
    }

    if !result.thresholds.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {}", "thresholds".bright_cyan().bold());
        for threshold in &result.thresholds {
            let _ = writeln!(out, "    {}", threshold_line(threshold));
        }
    }

    let _ = writeln!(out);
    for (name, summary) in &result.metrics.metrics {
        if !summary.has_data() {
            continue;
        }
        let dots = ".".repeat(NAME_WIDTH.saturating_sub(name.len()));
        let _ = writeln!(out, "  {}{}: {}", name, dots.dimmed(), metric_line(name, summary));
    }

    if let Some(error) = &result.teardown_error {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {} teardown failed: {}", "⚠".bright_yellow().bold(), error);
    }

    let _ = writeln!(out);
    let verdict = if result.passed {
        "PASSED".bright_green().bold()
    } else {
        "FAILED".bright_red().bold()
    };
    if result.interrupted {
        let _ = writeln!(out, "  result: {} (interrupted)", verdict);
    } else {
        let _ = writeln!(out, "  result: {}", verdict);
    }
    out
}

fn threshold_line(threshold: &ThresholdResult) -> String {
    let marker = match (threshold.passed, threshold.severity) {
        (true, _) => "✓".bright_green().bold(),
        (false, Severity::Warning) => "⚠".bright_yellow().bold(),
        (false, Severity::Error) => "✗".bright_red().bold(),
    };
    let detail = match (&threshold.observed, &threshold.reason) {
        (Some(observed), _) => format!("observed {}", number(*observed)),
        (None, Some(reason)) => reason.clone(),
        (None, None) => String::new(),
    };
    format!(
        "{} {}: {} ({})",
        marker, threshold.metric, threshold.expression, detail
    )
}

fn metric_line(name: &str, summary: &MetricSummary) -> String {
    match summary {
        MetricSummary::Counter { count, rate } => format!("{} {}/s", count, number(*rate)),
        MetricSummary::Rate { passes, fails, rate } => format!(
            "{:.2}% {} of {}",
            rate * 100.0,
            passes,
            passes + fails
        ),
        MetricSummary::Trend(trend) if is_duration(name) => trend_line(trend, millis),
        MetricSummary::Trend(trend) => trend_line(trend, number),
        MetricSummary::Gauge { value, min, max, .. } => format!(
            "{} min={} max={}",
            number(*value),
            number(*min),
            number(*max)
        ),
    }
}

fn trend_line(trend: &TrendSummary, fmt: fn(f64) -> String) -> String {
    format!(
        "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
        fmt(trend.avg),
        fmt(trend.min),
        fmt(trend.med),
        fmt(trend.max),
        fmt(trend.p90),
        fmt(trend.p95),
        fmt(trend.p99)
    )
}

fn is_duration(name: &str) -> bool {
    let base = name.split('{').next().unwrap_or(name);
    base.ends_with("_duration")
}

fn millis(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.2}ms", ms)
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
