//! Core library for the air quality monitor
//!
//! This crate provides the core functionality for:
//! - Reducing unbounded sensor histories to bounded chart series
//! - Typed caches that can be evicted under memory pressure
//! - Heap-budget enforcement with graduated cleanup
//! - Health checks and observability

pub mod cache;
pub mod health;
pub mod memory;
pub mod models;
pub mod observability;
pub mod series;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{
    DiagnosticsSink, MetricsDiagnostics, MonitorMetrics, NoopDiagnostics, StructuredLogger,
};
