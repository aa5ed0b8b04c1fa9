//! Core data models for the chart pipeline

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Measured channel on a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    /// Composite air quality index
    Aqi,
    Pm1,
    Pm25,
    Pm10,
    Co2,
    Voc,
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
    Rainfall,
}

impl MetricKey {
    /// Every known channel, index first
    pub const ALL: [MetricKey; 11] = [
        MetricKey::Aqi,
        MetricKey::Pm1,
        MetricKey::Pm25,
        MetricKey::Pm10,
        MetricKey::Co2,
        MetricKey::Voc,
        MetricKey::Temperature,
        MetricKey::Humidity,
        MetricKey::Pressure,
        MetricKey::WindSpeed,
        MetricKey::Rainfall,
    ];

    /// Weather channels rendered together on the weather history view
    pub const WEATHER: [MetricKey; 5] = [
        MetricKey::Temperature,
        MetricKey::Humidity,
        MetricKey::Pressure,
        MetricKey::WindSpeed,
        MetricKey::Rainfall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Aqi => "aqi",
            MetricKey::Pm1 => "pm1",
            MetricKey::Pm25 => "pm25",
            MetricKey::Pm10 => "pm10",
            MetricKey::Co2 => "co2",
            MetricKey::Voc => "voc",
            MetricKey::Temperature => "temperature",
            MetricKey::Humidity => "humidity",
            MetricKey::Pressure => "pressure",
            MetricKey::WindSpeed => "wind_speed",
            MetricKey::Rainfall => "rainfall",
        }
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['.', '-'], "_");
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized || (normalized == "pm2_5" && *key == MetricKey::Pm25))
            .ok_or_else(|| anyhow::anyhow!("Unknown metric key: {}", s))
    }
}

/// One historical reading as delivered by the data-fetch layer
///
/// Samples are immutable once fetched and shared as `Arc<Sample>` so that
/// chart points and caches reference the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metric_values: HashMap<MetricKey, Option<f64>>,
    #[serde(default)]
    pub location_label: String,
    #[serde(default)]
    pub source_id: String,
}

impl Sample {
    /// Finite value for a metric, if the reading carries one
    pub fn value(&self, metric: MetricKey) -> Option<f64> {
        self.metric_values
            .get(&metric)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }
}

/// Render-ready output unit
#[derive(Debug, Clone, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub display_label: String,
    pub value: f64,
    /// Number of samples aggregated into this point; absent when not binned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_count: Option<usize>,
    /// Real reading behind the point (first sample of a bin)
    pub source_sample: Arc<Sample>,
}

impl ChartPoint {
    /// Whether this point stands for more than one sample
    pub fn is_binned(&self) -> bool {
        self.original_count.is_some()
    }
}

/// Provenance of a transformed series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformMeta {
    /// Valid samples inside the window before binning
    pub original_count: usize,
    pub rendered_count: usize,
    /// Zero when no binning happened
    pub bin_width_hours: u32,
}

/// Bounded, chronologically ordered series plus provenance
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformResult {
    pub points: Vec<ChartPoint>,
    pub meta: TransformMeta,
}

impl TransformResult {
    /// Whether the renderer should show an aggregation indicator
    pub fn is_aggregated(&self) -> bool {
        self.meta.bin_width_hours > 0
    }
}

/// Read a JSON array of samples from disk
pub fn read_samples(path: &Path) -> Result<Vec<Arc<Sample>>> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open samples file {:?}", path))?;

    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .context("Failed to read samples file")?;

    let samples: Vec<Sample> =
        serde_json::from_slice(&data).context("Failed to deserialize samples")?;

    Ok(samples.into_iter().map(Arc::new).collect())
}
