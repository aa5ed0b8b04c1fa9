//! Adaptive downsampling of historical readings
//!
//! This module turns an unbounded sequence of fetched samples into a
//! bounded, chart-renderable series:
//! - Window resolution from a range selector
//! - Point budget selection from the surface size class
//! - Epoch-anchored binning with snapped bin widths
//! - Per-metric orchestration with display labels

mod binning;
mod labels;
mod threshold;
mod transform;
mod window;

pub use binning::{bin_key, bin_width_hours, downsample, prepare, snap_bin_width, transform};
pub use labels::{display_label, relative_label, LabelGranularity};
pub use threshold::{select as select_point_budget, SizeClass};
pub use transform::{PreparedSeries, SeriesTransform};
pub use window::{resolve, RangeSelector, TimeWindow};
