//! Observability infrastructure for the monitor
//!
//! Provides:
//! - Prometheus metrics (heap usage, budget state, cleanup passes, transform latency)
//! - Structured JSON logging with tracing
//! - The [`DiagnosticsSink`] seam the memory guard and series transform report into

use crate::memory::{BudgetState, CleanupReport, TickOutcome};
use crate::models::{MetricKey, TransformMeta};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default histogram buckets for transform latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    heap_usage_mb: Gauge,
    budget_state: IntGauge,
    cleanup_passes: IntCounterVec,
    items_evicted: IntCounter,
    reloads_requested: IntCounter,
    transform_latency_seconds: Histogram,
    points_rendered: IntGaugeVec,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            heap_usage_mb: register_gauge!(
                "aqmon_heap_usage_megabytes",
                "Most recent heap usage measurement in megabytes"
            )
            .expect("Failed to register heap_usage_megabytes"),

            budget_state: register_int_gauge!(
                "aqmon_budget_state",
                "Current budget classification (0=ok, 1=warn, 2=critical, 3=emergency)"
            )
            .expect("Failed to register budget_state"),

            cleanup_passes: register_int_counter_vec!(
                "aqmon_cleanup_passes_total",
                "Cleanup passes run, by severity",
                &["severity"]
            )
            .expect("Failed to register cleanup_passes_total"),

            items_evicted: register_int_counter!(
                "aqmon_evicted_items_total",
                "Cached items and entries removed by cleanup"
            )
            .expect("Failed to register evicted_items_total"),

            reloads_requested: register_int_counter!(
                "aqmon_reloads_requested_total",
                "Host reloads requested by the emergency breaker"
            )
            .expect("Failed to register reloads_requested_total"),

            transform_latency_seconds: register_histogram!(
                "aqmon_transform_latency_seconds",
                "Time spent binning and labelling one series",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register transform_latency_seconds"),

            points_rendered: register_int_gauge_vec!(
                "aqmon_points_rendered",
                "Points in the most recently transformed series, by metric",
                &["metric"]
            )
            .expect("Failed to register points_rendered"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    inner: &'static MonitorMetricsInner,
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new),
        }
    }

    pub fn set_heap_usage(&self, usage_mb: f64) {
        self.inner.heap_usage_mb.set(usage_mb);
    }

    pub fn set_budget_state(&self, state: BudgetState) {
        self.inner.budget_state.set(state.level());
    }

    /// Count one pass and everything it removed
    pub fn record_cleanup(&self, severity: BudgetState, removed: usize) {
        let severity = severity.to_string();
        self.inner
            .cleanup_passes
            .with_label_values(&[severity.as_str()])
            .inc();
        self.inner.items_evicted.inc_by(removed as u64);
    }

    pub fn inc_reloads(&self) {
        self.inner.reloads_requested.inc();
    }

    pub fn observe_transform(&self, metric: MetricKey, rendered: usize, elapsed: Duration) {
        self.inner
            .transform_latency_seconds
            .observe(elapsed.as_secs_f64());
        self.inner
            .points_rendered
            .with_label_values(&[metric.as_str()])
            .set(rendered as i64);
    }
}

/// Receiver of guard and pipeline events
///
/// Every method defaults to a no-op so sinks implement only what they use.
pub trait DiagnosticsSink: Send + Sync {
    fn on_tick(&self, _outcome: &TickOutcome) {}

    fn on_transition(&self, _from: BudgetState, _to: BudgetState, _usage_mb: Option<f64>) {}

    fn on_cleanup(&self, _report: &CleanupReport) {}

    fn on_reload(&self, _reason: &str, _usage_mb: Option<f64>) {}

    fn on_series_transformed(&self, _metric: MetricKey, _meta: &TransformMeta, _elapsed: Duration) {}
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {}

/// Sink that feeds Prometheus metrics and structured event logs
#[derive(Clone)]
pub struct MetricsDiagnostics {
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl MetricsDiagnostics {
    pub fn new(metrics: MonitorMetrics, logger: StructuredLogger) -> Self {
        Self { metrics, logger }
    }
}

impl DiagnosticsSink for MetricsDiagnostics {
    fn on_tick(&self, outcome: &TickOutcome) {
        if let Some(usage_mb) = outcome.usage_mb {
            self.metrics.set_heap_usage(usage_mb);
        }
        self.metrics.set_budget_state(outcome.state);
    }

    fn on_transition(&self, from: BudgetState, to: BudgetState, usage_mb: Option<f64>) {
        self.logger.log_budget_transition(from, to, usage_mb);
    }

    fn on_cleanup(&self, report: &CleanupReport) {
        if let Some(severity) = report.severity {
            self.metrics.record_cleanup(severity, report.removed());
        }
        self.logger.log_cleanup_completed(report);
    }

    fn on_reload(&self, reason: &str, usage_mb: Option<f64>) {
        self.metrics.inc_reloads();
        self.logger.log_reload_requested(reason, usage_mb);
    }

    fn on_series_transformed(&self, metric: MetricKey, meta: &TransformMeta, elapsed: Duration) {
        self.metrics
            .observe_transform(metric, meta.rendered_count, elapsed);
        self.logger.log_series_transformed(metric, meta, elapsed);
    }
}

/// Structured logger for monitor events
///
/// Consistent event-named JSON logging for budget transitions, cleanup
/// passes and reload requests.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a change of budget classification
    pub fn log_budget_transition(&self, from: BudgetState, to: BudgetState, usage_mb: Option<f64>) {
        if to > from && to.is_critical_or_worse() {
            warn!(
                event = "budget_transition",
                instance = %self.instance,
                from = %from,
                to = %to,
                usage_mb = ?usage_mb,
                "Heap usage escalated"
            );
        } else {
            info!(
                event = "budget_transition",
                instance = %self.instance,
                from = %from,
                to = %to,
                usage_mb = ?usage_mb,
                "Heap budget state changed"
            );
        }
    }

    /// Log a finished cleanup pass
    pub fn log_cleanup_completed(&self, report: &CleanupReport) {
        let severity = report
            .severity
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        info!(
            event = "cleanup_completed",
            instance = %self.instance,
            severity = %severity,
            items_truncated = report.items_truncated,
            entries_evicted = report.entries_evicted,
            entries_cleared = report.entries_cleared,
            transient_cleared = report.transient_cleared,
            gc_hinted = report.gc_hinted,
            "Cleanup pass completed"
        );
    }

    /// Log the emergency breaker asking for a reload
    pub fn log_reload_requested(&self, reason: &str, usage_mb: Option<f64>) {
        error!(
            event = "reload_requested",
            instance = %self.instance,
            reason = %reason,
            usage_mb = ?usage_mb,
            "Reload requested by emergency breaker"
        );
    }

    /// Log a transformed chart series
    pub fn log_series_transformed(&self, metric: MetricKey, meta: &TransformMeta, elapsed: Duration) {
        info!(
            event = "series_transformed",
            instance = %self.instance,
            metric = %metric,
            original = meta.original_count,
            rendered = meta.rendered_count,
            bin_width_hours = meta.bin_width_hours,
            elapsed_us = elapsed.as_micros() as u64,
            "Series transformed"
        );
    }

    /// Log process startup
    pub fn log_startup(&self, version: &str, warn_mb: f64, emergency_mb: f64) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            warn_mb = warn_mb,
            emergency_mb = emergency_mb,
            "Air quality monitor started"
        );
    }

    /// Log process shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Air quality monitor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::CleanupDecision;
    use crate::models::Sample;
    use crate::series::{RangeSelector, SeriesTransform};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_monitor_metrics_creation() {
        // Metrics live in the global registry; repeated handles share them
        let metrics = MonitorMetrics::new();
        let again = MonitorMetrics::new();

        metrics.set_heap_usage(92.5);
        metrics.set_budget_state(BudgetState::Warn);
        metrics.record_cleanup(BudgetState::Warn, 12);
        again.inc_reloads();
        again.observe_transform(MetricKey::Pm25, 361, Duration::from_micros(850));
    }

    #[test]
    fn test_metrics_diagnostics_accepts_events() {
        let sink = MetricsDiagnostics::new(MonitorMetrics::new(), StructuredLogger::new("test"));
        sink.on_tick(&TickOutcome {
            usage_mb: Some(125.0),
            previous: BudgetState::Warn,
            state: BudgetState::Critical,
            decision: CleanupDecision::Run(BudgetState::Critical),
        });
        sink.on_transition(BudgetState::Warn, BudgetState::Critical, Some(125.0));
        sink.on_cleanup(&CleanupReport {
            severity: Some(BudgetState::Critical),
            entries_cleared: 3,
            ..CleanupReport::default()
        });
        sink.on_reload("still above emergency", Some(145.0));
    }

    #[derive(Default)]
    struct RecordingSink {
        series: Mutex<Vec<(MetricKey, usize)>>,
    }

    impl DiagnosticsSink for RecordingSink {
        fn on_series_transformed(&self, metric: MetricKey, meta: &TransformMeta, _elapsed: Duration) {
            self.series.lock().unwrap().push((metric, meta.rendered_count));
        }
    }

    #[test]
    fn test_transform_reports_to_injected_sink() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let mut metric_values = HashMap::new();
        metric_values.insert(MetricKey::Co2, Some(612.0));
        let samples = vec![Arc::new(Sample {
            timestamp: now - chrono::Duration::hours(1),
            metric_values,
            location_label: "Office".to_string(),
            source_id: "co2-1".to_string(),
        })];

        let sink = Arc::new(RecordingSink::default());
        SeriesTransform::new(RangeSelector::Last24h, now, None)
            .with_diagnostics(sink.clone())
            .transform(&samples, MetricKey::Co2);

        assert_eq!(*sink.series.lock().unwrap(), vec![(MetricKey::Co2, 1)]);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
