//! Time window resolution
//!
//! Turns a symbolic range selector into a concrete `[start, end]` pair.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Symbolic range chosen on a history view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSelector {
    Last24h,
    Last7d,
    Last30d,
    Last90d,
    All,
    Custom {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl RangeSelector {
    /// Fixed lookback for the rolling selectors
    fn lookback(&self) -> Option<Duration> {
        match self {
            RangeSelector::Last24h => Some(Duration::hours(24)),
            RangeSelector::Last7d => Some(Duration::days(7)),
            RangeSelector::Last30d => Some(Duration::days(30)),
            RangeSelector::Last90d => Some(Duration::days(90)),
            RangeSelector::All | RangeSelector::Custom { .. } => None,
        }
    }
}

impl std::fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeSelector::Last24h => write!(f, "24h"),
            RangeSelector::Last7d => write!(f, "7d"),
            RangeSelector::Last30d => write!(f, "30d"),
            RangeSelector::Last90d => write!(f, "90d"),
            RangeSelector::All => write!(f, "all"),
            RangeSelector::Custom { .. } => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for RangeSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "24h" | "1d" | "last24h" => Ok(RangeSelector::Last24h),
            "7d" | "1w" | "last7d" => Ok(RangeSelector::Last7d),
            "30d" | "last30d" => Ok(RangeSelector::Last30d),
            "90d" | "last90d" => Ok(RangeSelector::Last90d),
            "all" => Ok(RangeSelector::All),
            other => Err(anyhow::anyhow!(
                "Unknown range '{}', expected one of 24h, 7d, 30d, 90d, all",
                other
            )),
        }
    }
}

/// Concrete time range, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, swapping reversed bounds
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Window produced for `RangeSelector::All`
    pub fn unbounded(end: DateTime<Utc>) -> Self {
        Self {
            start: DateTime::UNIX_EPOCH,
            end,
        }
    }

    /// Whether the start is the epoch sentinel
    pub fn is_unbounded(&self) -> bool {
        self.start == DateTime::UNIX_EPOCH
    }

    /// Inclusive containment check
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Span in fractional hours
    pub fn hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }
}

/// Resolve a selector against the current instant
///
/// Custom windows missing either bound fall back to the last 30 days.
pub fn resolve(selector: RangeSelector, now: DateTime<Utc>) -> TimeWindow {
    match selector {
        RangeSelector::All => TimeWindow::unbounded(now),
        RangeSelector::Custom {
            start: Some(start),
            end: Some(end),
        } => TimeWindow::new(start, end),
        RangeSelector::Custom { .. } => resolve(RangeSelector::Last30d, now),
        rolling => {
            let lookback = rolling.lookback().unwrap_or_else(|| Duration::days(30));
            TimeWindow::new(now - lookback, now)
        }
    }
}
