//! Component health for liveness and readiness probes
//!
//! The memory guard is the main producer: its budget classification maps
//! onto the `monitor` component, a requested reload marks `cleanup`
//! unhealthy so the host drops out of rotation before it restarts, and
//! `caches` degrades while the last pass cleared them.

use crate::memory::{BudgetState, CleanupReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component names for health tracking
pub mod components {
    pub const MONITOR: &str = "monitor";
    pub const CLEANUP: &str = "cleanup";
    pub const CACHES: &str = "caches";
}

/// Health of one component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, under pressure
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

impl From<BudgetState> for ComponentStatus {
    fn from(state: BudgetState) -> Self {
        match state {
            BudgetState::Ok => ComponentStatus::Healthy,
            BudgetState::Warn | BudgetState::Critical => ComponentStatus::Degraded,
            BudgetState::Emergency => ComponentStatus::Unhealthy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }

    /// Health of the memory guard for one budget classification
    pub fn from_budget(state: BudgetState, usage_mb: Option<f64>) -> Self {
        if state == BudgetState::Ok {
            return Self::healthy();
        }
        let usage = usage_mb
            .map(|mb| format!("{mb:.1} MB"))
            .unwrap_or_else(|| "unknown usage".to_string());
        Self::with_status(
            state.into(),
            Some(format!("Heap above {state} threshold ({usage})")),
        )
    }

    /// Health of the named caches after the latest cleanup pass
    ///
    /// Caches are degraded while the last pass cleared them wholesale;
    /// trimming and eviction alone leave them healthy.
    pub fn from_cleanup(report: Option<&CleanupReport>) -> Self {
        match report {
            Some(report) if report.entries_cleared > 0 => {
                let severity = report
                    .severity
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "manual".to_string());
                Self::degraded(format!(
                    "Caches cleared by {severity} cleanup ({} entries)",
                    report.entries_cleared
                ))
            }
            _ => Self::healthy(),
        }
    }
}

/// Body of the liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across components
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of the readiness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared component health table plus a readiness gate
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a component, starting healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), health);
    }

    /// Open or close the readiness gate
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    /// Ready once the gate is open and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Agent not yet initialized".to_string()),
            };
        }

        let failing: Vec<&str> = state
            .components
            .iter()
            .filter(|(_, health)| !health.status.is_operational())
            .map(|(name, _)| name.as_str())
            .collect();

        if failing.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("Unhealthy: {}", failing.join(", "))),
            }
        }
    }
}
