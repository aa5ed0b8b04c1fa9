//! Heap budget thresholds and classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes per megabyte used for all budget arithmetic
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Pressure classification for one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetState {
    Ok,
    Warn,
    Critical,
    Emergency,
}

impl BudgetState {
    /// Whether this state calls for the full clear-everything pass
    pub fn is_critical_or_worse(&self) -> bool {
        matches!(self, BudgetState::Critical | BudgetState::Emergency)
    }

    /// Numeric level for gauges (0 = ok .. 3 = emergency)
    pub fn level(&self) -> i64 {
        match self {
            BudgetState::Ok => 0,
            BudgetState::Warn => 1,
            BudgetState::Critical => 2,
            BudgetState::Emergency => 3,
        }
    }
}

impl std::fmt::Display for BudgetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetState::Ok => write!(f, "ok"),
            BudgetState::Warn => write!(f, "warn"),
            BudgetState::Critical => write!(f, "critical"),
            BudgetState::Emergency => write!(f, "emergency"),
        }
    }
}

/// Invalid budget configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("budget thresholds must be positive and finite, got {name} = {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("budget thresholds must increase: {lower} ({lower_mb} MB) must be below {upper} ({upper_mb} MB)")]
    NotIncreasing {
        lower: &'static str,
        lower_mb: f64,
        upper: &'static str,
        upper_mb: f64,
    },
}

/// Process-wide heap thresholds in megabytes
///
/// `warn < critical < emergency <= hard_max`. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryBudget {
    warn_mb: f64,
    critical_mb: f64,
    emergency_mb: f64,
    hard_max_mb: f64,
}

impl MemoryBudget {
    /// Validate and build a budget
    pub fn new(
        warn_mb: f64,
        critical_mb: f64,
        emergency_mb: f64,
        hard_max_mb: f64,
    ) -> Result<Self, BudgetError> {
        let named = [
            ("warn", warn_mb),
            ("critical", critical_mb),
            ("emergency", emergency_mb),
            ("hard_max", hard_max_mb),
        ];

        for (name, value) in named {
            if !value.is_finite() || value <= 0.0 {
                return Err(BudgetError::InvalidThreshold { name, value });
            }
        }

        for pair in named[..3].windows(2) {
            let ((lower, lower_mb), (upper, upper_mb)) = (pair[0], pair[1]);
            if lower_mb >= upper_mb {
                return Err(BudgetError::NotIncreasing {
                    lower,
                    lower_mb,
                    upper,
                    upper_mb,
                });
            }
        }

        if emergency_mb > hard_max_mb {
            return Err(BudgetError::NotIncreasing {
                lower: "emergency",
                lower_mb: emergency_mb,
                upper: "hard_max",
                upper_mb: hard_max_mb,
            });
        }

        Ok(Self {
            warn_mb,
            critical_mb,
            emergency_mb,
            hard_max_mb,
        })
    }

    pub fn warn_mb(&self) -> f64 {
        self.warn_mb
    }

    pub fn critical_mb(&self) -> f64 {
        self.critical_mb
    }

    pub fn emergency_mb(&self) -> f64 {
        self.emergency_mb
    }

    pub fn hard_max_mb(&self) -> f64 {
        self.hard_max_mb
    }

    /// Classify a usage figure against the half-open threshold bands
    pub fn classify(&self, usage_mb: f64) -> BudgetState {
        if usage_mb >= self.emergency_mb {
            BudgetState::Emergency
        } else if usage_mb >= self.critical_mb {
            BudgetState::Critical
        } else if usage_mb >= self.warn_mb {
            BudgetState::Warn
        } else {
            BudgetState::Ok
        }
    }

    /// Usage as a fraction of the hard ceiling
    pub fn utilization(&self, usage_mb: f64) -> f64 {
        usage_mb / self.hard_max_mb
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self {
            warn_mb: 80.0,
            critical_mb: 120.0,
            emergency_mb: 140.0,
            hard_max_mb: 150.0,
        }
    }
}

/// Per-cache limits enforced by the cleanup coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemBudget {
    pub max_entries: Option<usize>,
    pub max_array_length: Option<usize>,
}

impl SubsystemBudget {
    pub fn new(max_entries: Option<usize>, max_array_length: Option<usize>) -> Self {
        Self {
            max_entries,
            max_array_length,
        }
    }

    /// Default limits for the remote-data cache
    pub fn remote_data() -> Self {
        Self::new(Some(50), Some(1000))
    }

    /// Default limits for the derived-data cache
    pub fn derived_data() -> Self {
        Self::new(Some(100), Some(1000))
    }

    /// Default limits for the image cache
    pub fn image_cache() -> Self {
        Self::new(Some(30), None)
    }
}
