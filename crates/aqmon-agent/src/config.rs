//! Agent configuration

use anyhow::{Context, Result};
use aqmon_lib::memory::{GuardConfig, MemoryBudget, SubsystemBudget};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "AQMON_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Instance name attached to structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_warn_mb")]
    pub warn_mb: f64,

    #[serde(default = "default_critical_mb")]
    pub critical_mb: f64,

    #[serde(default = "default_emergency_mb")]
    pub emergency_mb: f64,

    #[serde(default = "default_hard_max_mb")]
    pub hard_max_mb: f64,

    /// Heap measurement interval in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Hygiene sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Minimum spacing between warn-level passes in milliseconds
    #[serde(default = "default_throttle")]
    pub throttle_ms: u64,

    /// Delay before re-measuring after an emergency pass, in milliseconds
    #[serde(default = "default_recheck_delay")]
    pub recheck_delay_ms: u64,

    #[serde(default = "default_remote_data_max_entries")]
    pub remote_data_max_entries: usize,

    #[serde(default = "default_max_array_length")]
    pub remote_data_max_array_length: usize,

    #[serde(default = "default_derived_data_max_entries")]
    pub derived_data_max_entries: usize,

    #[serde(default = "default_max_array_length")]
    pub derived_data_max_array_length: usize,

    #[serde(default = "default_image_cache_max_entries")]
    pub image_cache_max_entries: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "aqmon".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_warn_mb() -> f64 {
    MemoryBudget::default().warn_mb()
}

fn default_critical_mb() -> f64 {
    MemoryBudget::default().critical_mb()
}

fn default_emergency_mb() -> f64 {
    MemoryBudget::default().emergency_mb()
}

fn default_hard_max_mb() -> f64 {
    MemoryBudget::default().hard_max_mb()
}

fn default_tick_interval() -> u64 {
    12
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_throttle() -> u64 {
    5_000
}

fn default_recheck_delay() -> u64 {
    3_000
}

fn default_remote_data_max_entries() -> usize {
    50
}

fn default_derived_data_max_entries() -> usize {
    100
}

fn default_max_array_length() -> usize {
    1000
}

fn default_image_cache_max_entries() -> usize {
    30
}

impl AgentConfig {
    /// Load configuration from the optional config file and the environment
    ///
    /// `AQMON_*` variables override file values.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder = builder.add_source(config::Environment::with_prefix("AQMON"));

        Self::from_config(builder.build().context("Failed to read configuration")?)
    }

    /// Deserialize and validate an already assembled configuration
    pub fn from_config(config: config::Config) -> Result<Self> {
        let agent: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        agent.budget().context("Invalid memory budget")?;
        Ok(agent)
    }

    pub fn budget(&self) -> Result<MemoryBudget> {
        Ok(MemoryBudget::new(
            self.warn_mb,
            self.critical_mb,
            self.emergency_mb,
            self.hard_max_mb,
        )?)
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            throttle: Duration::from_millis(self.throttle_ms),
            recheck_delay: Duration::from_millis(self.recheck_delay_ms),
        }
    }

    pub fn remote_data_budget(&self) -> SubsystemBudget {
        SubsystemBudget::new(
            Some(self.remote_data_max_entries),
            Some(self.remote_data_max_array_length),
        )
    }

    pub fn derived_data_budget(&self) -> SubsystemBudget {
        SubsystemBudget::new(
            Some(self.derived_data_max_entries),
            Some(self.derived_data_max_array_length),
        )
    }

    pub fn image_cache_budget(&self) -> SubsystemBudget {
        SubsystemBudget::new(Some(self.image_cache_max_entries), None)
    }
}
