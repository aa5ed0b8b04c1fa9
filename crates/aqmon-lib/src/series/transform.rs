//! Per-metric series orchestration
//!
//! Resolves the window, picks the point budget, bins, and attaches display
//! labels. One raw fetch is windowed and sorted once, then each metric is
//! binned independently so missing values on one channel never drop points
//! from another.

use super::binning;
use super::labels::{display_label, LabelGranularity};
use super::threshold;
use super::window::{resolve, RangeSelector, TimeWindow};
use crate::models::{MetricKey, Sample, TransformResult};
use crate::observability::DiagnosticsSink;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Series transform bound to one selector, instant and surface
#[derive(Clone)]
pub struct SeriesTransform {
    selector: RangeSelector,
    window: TimeWindow,
    now: DateTime<Utc>,
    point_budget: usize,
    granularity: LabelGranularity,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
}

impl SeriesTransform {
    /// Create a transform for a range and a measured surface width
    pub fn new(selector: RangeSelector, now: DateTime<Utc>, surface_width_px: Option<u32>) -> Self {
        let window = resolve(selector, now);
        Self {
            selector,
            window,
            now,
            point_budget: threshold::select(surface_width_px),
            granularity: LabelGranularity::for_range(&selector, &window),
            diagnostics: None,
        }
    }

    /// Report every transformed series to `sink`
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Override the size-class budget
    pub fn with_point_budget(mut self, point_budget: usize) -> Self {
        self.point_budget = point_budget;
        self
    }

    pub fn selector(&self) -> RangeSelector {
        self.selector
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn point_budget(&self) -> usize {
        self.point_budget
    }

    /// Window and sort a raw fetch once for any number of metrics
    pub fn prepare(&self, samples: &[Arc<Sample>]) -> PreparedSeries<'_> {
        PreparedSeries {
            transform: self,
            samples: binning::prepare(samples, &self.window),
        }
    }

    /// Transform a single metric
    pub fn transform(&self, samples: &[Arc<Sample>], metric: MetricKey) -> TransformResult {
        self.prepare(samples).series(metric)
    }

    /// Transform several metrics from one fetch
    pub fn transform_many(
        &self,
        samples: &[Arc<Sample>],
        metrics: &[MetricKey],
    ) -> BTreeMap<MetricKey, TransformResult> {
        let prepared = self.prepare(samples);
        metrics
            .iter()
            .map(|metric| (*metric, prepared.series(*metric)))
            .collect()
    }
}

/// Windowed, sorted samples shared by every metric of one fetch
pub struct PreparedSeries<'a> {
    transform: &'a SeriesTransform,
    samples: Vec<Arc<Sample>>,
}

impl PreparedSeries<'_> {
    /// Samples surviving the window filter
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bin and label one metric
    pub fn series(&self, metric: MetricKey) -> TransformResult {
        let t = self.transform;
        let started = Instant::now();
        let label = |ts: DateTime<Utc>| display_label(ts, t.now, t.granularity);
        let result = binning::downsample(&self.samples, &t.window, metric, t.point_budget, &label);

        debug!(
            metric = %metric,
            range = %t.selector,
            original = result.meta.original_count,
            rendered = result.meta.rendered_count,
            bin_width_hours = result.meta.bin_width_hours,
            "Series transformed"
        );

        if let Some(sink) = &t.diagnostics {
            sink.on_series_transformed(metric, &result.meta, started.elapsed());
        }

        result
    }
}

impl std::fmt::Debug for SeriesTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesTransform")
            .field("selector", &self.selector)
            .field("window", &self.window)
            .field("now", &self.now)
            .field("point_budget", &self.point_budget)
            .field("granularity", &self.granularity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 30, 0).unwrap()
    }

    fn weather_sample(ts: DateTime<Utc>, temperature: Option<f64>, humidity: Option<f64>) -> Arc<Sample> {
        let mut metric_values = HashMap::new();
        metric_values.insert(MetricKey::Temperature, temperature);
        metric_values.insert(MetricKey::Humidity, humidity);
        Arc::new(Sample {
            timestamp: ts,
            metric_values,
            location_label: "Garden".to_string(),
            source_id: "station-7".to_string(),
        })
    }

    #[test]
    fn test_budget_follows_surface_width() {
        assert_eq!(SeriesTransform::new(RangeSelector::Last7d, now(), Some(360)).point_budget(), 400);
        assert_eq!(SeriesTransform::new(RangeSelector::Last7d, now(), Some(800)).point_budget(), 600);
        assert_eq!(SeriesTransform::new(RangeSelector::Last7d, now(), None).point_budget(), 1000);
        assert_eq!(
            SeriesTransform::new(RangeSelector::Last7d, now(), None)
                .with_point_budget(50)
                .point_budget(),
            50
        );
    }

    #[test]
    fn test_metrics_filtered_independently() {
        let samples = vec![
            weather_sample(now() - Duration::hours(3), Some(20.0), None),
            weather_sample(now() - Duration::hours(2), Some(21.0), Some(55.0)),
            weather_sample(now() - Duration::hours(1), None, Some(57.0)),
        ];
        let transform = SeriesTransform::new(RangeSelector::Last24h, now(), None);

        let results = transform.transform_many(&samples, &[MetricKey::Temperature, MetricKey::Humidity]);

        assert_eq!(results[&MetricKey::Temperature].meta.rendered_count, 2);
        assert_eq!(results[&MetricKey::Humidity].meta.rendered_count, 2);
        assert_eq!(results[&MetricKey::Temperature].points[1].value, 21.0);
        assert_eq!(results[&MetricKey::Humidity].points[1].value, 57.0);
    }

    #[test]
    fn test_prepare_windows_once() {
        let samples = vec![
            weather_sample(now() - Duration::days(10), Some(15.0), Some(40.0)),
            weather_sample(now() - Duration::hours(2), Some(21.0), Some(55.0)),
        ];
        let transform = SeriesTransform::new(RangeSelector::Last7d, now(), None);
        let prepared = transform.prepare(&samples);

        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared.series(MetricKey::Temperature).meta.original_count, 1);
        assert_eq!(prepared.series(MetricKey::Humidity).meta.original_count, 1);
    }

    #[test]
    fn test_labels_relative_and_absolute() {
        let samples = vec![
            weather_sample(now() - Duration::days(20), Some(15.0), None),
            weather_sample(now() - Duration::hours(3), Some(21.0), None),
        ];
        let transform = SeriesTransform::new(RangeSelector::Last30d, now(), None);

        let result = transform.transform(&samples, MetricKey::Temperature);

        assert_eq!(result.points[0].display_label, "May 26");
        assert_eq!(result.points[1].display_label, "3 hours ago");
    }

    #[test]
    fn test_binned_series_keeps_real_source_sample() {
        let window_start = now() - Duration::days(30);
        let samples: Vec<Arc<Sample>> = (0..2000)
            .map(|i| weather_sample(window_start + Duration::minutes(20 * i + 1), Some(18.0), None))
            .collect();
        let transform = SeriesTransform::new(RangeSelector::Last30d, now(), Some(320));

        let result = transform.transform(&samples, MetricKey::Temperature);

        assert!(result.is_aggregated());
        assert!(result.meta.rendered_count <= 400);
        for point in &result.points {
            assert!(samples.iter().any(|s| Arc::ptr_eq(s, &point.source_sample)));
            assert_eq!(point.value, 18.0);
        }
    }
}
