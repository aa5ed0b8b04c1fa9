//! HTTP API for health checks, Prometheus metrics and guard control

use aqmon_lib::{
    cache::EvictableCache,
    health::{components, ComponentHealth, HealthRegistry},
    memory::{BudgetState, GuardHandle, GuardSnapshot, Visibility},
    observability::MonitorMetrics,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub snapshots: watch::Receiver<GuardSnapshot>,
    pub guard: GuardHandle,
    pub caches: Vec<Arc<dyn EvictableCache>>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: MonitorMetrics,
        snapshots: watch::Receiver<GuardSnapshot>,
        guard: GuardHandle,
        caches: Vec<Arc<dyn EvictableCache>>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            snapshots,
            guard,
            caches,
        }
    }
}

/// Occupancy of one named cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub name: String,
    pub entries: usize,
    pub items: usize,
}

/// Body of `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub guard: GuardSnapshot,
    pub caches: Vec<CacheStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupRequest {
    #[serde(default = "default_severity")]
    pub severity: BudgetState,
}

fn default_severity() -> BudgetState {
    BudgetState::Warn
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisibilityRequest {
    pub visibility: Visibility,
}

/// Liveness: 200 while every component is operational, 503 otherwise
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Current guard snapshot plus cache occupancy
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let guard = state.snapshots.borrow().clone();
    let caches = state
        .caches
        .iter()
        .map(|cache| CacheStatus {
            name: cache.name().to_string(),
            entries: cache.entry_count(),
            items: cache.item_count(),
        })
        .collect();

    Json(StatusResponse { guard, caches })
}

/// Queue an out-of-schedule cleanup pass
async fn cleanup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CleanupRequest>,
) -> impl IntoResponse {
    if request.severity == BudgetState::Ok {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "severity must be warn, critical or emergency" })),
        );
    }

    match state.guard.cleanup_now(request.severity).await {
        Ok(()) => {
            info!(severity = %request.severity, "Manual cleanup queued");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "accepted": true, "severity": request.severity })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Forward a host visibility change to the guard
async fn visibility(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VisibilityRequest>,
) -> impl IntoResponse {
    match state.guard.set_visibility(request.visibility).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "accepted": true, "visibility": request.visibility })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/cleanup", post(cleanup))
        .route("/visibility", post(visibility))
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}

/// Apply one guard snapshot to the health registry
pub async fn apply_snapshot(registry: &HealthRegistry, snapshot: &GuardSnapshot) {
    registry
        .update(
            components::MONITOR,
            ComponentHealth::from_budget(snapshot.state, snapshot.usage_mb),
        )
        .await;

    let cleanup = if snapshot.reload_requested {
        ComponentHealth::unhealthy("Emergency persisted after cleanup, reload requested")
    } else {
        ComponentHealth::healthy()
    };
    registry.update(components::CLEANUP, cleanup).await;

    registry
        .update(
            components::CACHES,
            ComponentHealth::from_cleanup(snapshot.last_cleanup.as_ref()),
        )
        .await;
}

/// Mirror guard snapshots into component health until shutdown
pub async fn sync_health(
    mut snapshots: watch::Receiver<GuardSnapshot>,
    registry: HealthRegistry,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    debug!("Guard snapshot channel closed");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                apply_snapshot(&registry, &snapshot).await;
            }
            _ = shutdown.recv() => {
                break;
            }
        }
    }
}
