//! Time-series binning
//!
//! Reduces a chronologically sorted sample sequence to at most roughly
//! `point_budget` chart points by grouping samples into fixed-width,
//! epoch-anchored time bins and averaging each bin.

use super::window::TimeWindow;
use crate::models::{ChartPoint, MetricKey, Sample, TransformMeta, TransformResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;

const SECS_PER_HOUR: i64 = 3600;

/// Label function applied to each emitted point timestamp
pub type Labeler<'a> = &'a dyn Fn(DateTime<Utc>) -> String;

/// Filter, sort and bin `samples` for one metric
///
/// Points are labelled with RFC 3339 timestamps; use
/// [`SeriesTransform`](super::SeriesTransform) for human-readable labels.
pub fn transform(
    samples: &[Arc<Sample>],
    window: &TimeWindow,
    metric: MetricKey,
    point_budget: usize,
) -> TransformResult {
    let prepared = prepare(samples, window);
    downsample(&prepared, window, metric, point_budget, &|ts: DateTime<Utc>| {
        ts.to_rfc3339()
    })
}

/// Restrict samples to the window and sort them chronologically
///
/// The unbounded `All` window is trusted as already filtered upstream and
/// is not applied. The sort is stable, so equal timestamps keep input order.
pub fn prepare(samples: &[Arc<Sample>], window: &TimeWindow) -> Vec<Arc<Sample>> {
    let mut prepared: Vec<Arc<Sample>> = if window.is_unbounded() {
        samples.to_vec()
    } else {
        samples
            .iter()
            .filter(|s| window.contains(s.timestamp))
            .cloned()
            .collect()
    };

    prepared.sort_by_key(|s| s.timestamp);
    prepared
}

/// Bin an already prepared (windowed, sorted) sequence for one metric
pub fn downsample(
    prepared: &[Arc<Sample>],
    window: &TimeWindow,
    metric: MetricKey,
    point_budget: usize,
    label: Labeler<'_>,
) -> TransformResult {
    let valid: Vec<(&Arc<Sample>, f64)> = prepared
        .iter()
        .filter_map(|s| s.value(metric).map(|v| (s, v)))
        .collect();

    let original_count = valid.len();
    if original_count == 0 {
        return TransformResult::default();
    }

    if original_count <= point_budget || original_count == 1 {
        let points = passthrough(&valid, label);
        return finish(points, original_count, 0);
    }

    let range_hours = effective_range_hours(window, &valid);
    let width = bin_width_hours(range_hours, point_budget);
    let points = bin(&valid, width, window.start, label);

    finish(points, original_count, width)
}

/// Compute the snapped bin width for a range and budget
pub fn bin_width_hours(range_hours: f64, point_budget: usize) -> u32 {
    let budget = point_budget.max(1) as f64;
    let raw = (range_hours.max(0.0) / budget).ceil();
    let raw = if raw.is_finite() && raw >= 1.0 {
        raw.min(u32::MAX as f64) as u32
    } else {
        1
    };
    snap_bin_width(raw)
}

/// Snap a raw width to 1h, 6h, 24h or a whole number of days
pub fn snap_bin_width(raw_hours: u32) -> u32 {
    match raw_hours {
        0..=1 => 1,
        2..=6 => 6,
        7..=24 => 24,
        n => n.div_ceil(24) * 24,
    }
}

/// Epoch-anchored bin key (in hours since epoch) for a timestamp
pub fn bin_key(ts: DateTime<Utc>, width_hours: u32) -> i64 {
    let width = i64::from(width_hours.max(1));
    let hour = ts.timestamp().div_euclid(SECS_PER_HOUR);
    hour.div_euclid(width) * width
}

/// Range used for the width computation
///
/// The `All` sentinel would otherwise measure from 1970; measure from the
/// earliest retained sample instead.
fn effective_range_hours(window: &TimeWindow, valid: &[(&Arc<Sample>, f64)]) -> f64 {
    if window.is_unbounded() {
        if let Some((first, _)) = valid.first() {
            let end = valid
                .last()
                .map(|(s, _)| s.timestamp)
                .unwrap_or(window.end)
                .max(window.end);
            return (end - first.timestamp).num_seconds() as f64 / SECS_PER_HOUR as f64;
        }
    }
    window.hours()
}

/// One point per distinct timestamp
///
/// Exact duplicate timestamps collapse into a single averaged point so the
/// output stays strictly increasing.
fn passthrough(valid: &[(&Arc<Sample>, f64)], label: Labeler<'_>) -> Vec<ChartPoint> {
    let mut groups: Vec<Accumulator> = Vec::with_capacity(valid.len());

    for (sample, value) in valid {
        match groups.last_mut() {
            Some(acc) if acc.first.timestamp == sample.timestamp => acc.add(*value),
            _ => groups.push(Accumulator::new(sample.timestamp, sample, *value)),
        }
    }

    groups
        .into_iter()
        .map(|acc| {
            let value = acc.mean();
            acc.into_point(value, label)
        })
        .collect()
}

/// Group into epoch-anchored bins and emit one rounded mean per bin
///
/// A bin straddling `floor` is stamped at `floor` so every point stays
/// inside the window; grouping still uses the epoch-anchored key.
fn bin(
    valid: &[(&Arc<Sample>, f64)],
    width_hours: u32,
    floor: DateTime<Utc>,
    label: Labeler<'_>,
) -> Vec<ChartPoint> {
    let mut bins: Vec<(i64, Accumulator)> = Vec::new();

    for (sample, value) in valid {
        let key = bin_key(sample.timestamp, width_hours);
        match bins.last_mut() {
            Some((last_key, acc)) if *last_key == key => acc.add(*value),
            _ => {
                let start = DateTime::from_timestamp(key * SECS_PER_HOUR, 0)
                    .unwrap_or(sample.timestamp)
                    .max(floor);
                bins.push((key, Accumulator::new(start, sample, *value)));
            }
        }
    }

    bins.into_iter()
        .map(|(_, acc)| {
            let value = acc.mean().round();
            acc.into_point(value, label)
        })
        .collect()
}

fn finish(points: Vec<ChartPoint>, original_count: usize, width: u32) -> TransformResult {
    let rendered_count = points.len();
    TransformResult {
        points,
        meta: TransformMeta {
            original_count,
            rendered_count,
            bin_width_hours: width,
        },
    }
}

/// Running sum for one output point
struct Accumulator {
    timestamp: DateTime<Utc>,
    first: Arc<Sample>,
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn new(timestamp: DateTime<Utc>, first: &Arc<Sample>, value: f64) -> Self {
        Self {
            timestamp,
            first: Arc::clone(first),
            sum: value,
            count: 1,
        }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    fn into_point(self, value: f64, label: Labeler<'_>) -> ChartPoint {
        ChartPoint {
            timestamp: self.timestamp,
            display_label: label(self.timestamp),
            value,
            original_count: (self.count > 1).then_some(self.count),
            source_sample: self.first,
        }
    }
}
