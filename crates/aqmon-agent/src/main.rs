//! Air quality monitor agent
//!
//! Owns the named caches, runs the memory guard and serves health,
//! metrics and status endpoints.

use anyhow::{Context, Result};
use aqmon_agent::{
    api,
    config::AgentConfig,
    host::{ProcessHost, RELOAD_EXIT_CODE},
};
use aqmon_lib::{
    cache::{self, names, EvictableCache, SessionStore},
    health::{components, HealthRegistry},
    memory::{CleanupCoordinator, MemoryGuard, ProcessMemoryProbe},
    observability::{MetricsDiagnostics, MonitorMetrics, StructuredLogger},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting aqmon-agent");

    let config = AgentConfig::load()?;
    let budget = config.budget()?;
    info!(instance = %config.instance_name, api_port = config.api_port, "Agent configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MONITOR).await;
    health_registry.register(components::CLEANUP).await;
    health_registry.register(components::CACHES).await;

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(AGENT_VERSION, budget.warn_mb(), budget.emergency_mb());

    // Named caches
    let remote_data = Arc::new(cache::remote_data_cache());
    let derived_data = Arc::new(cache::derived_data_cache());
    let images = Arc::new(cache::image_cache());
    let session = Arc::new(SessionStore::new(names::SESSION));

    let (host, mut reload_rx) = ProcessHost::new(logger.clone());
    let mut coordinator = CleanupCoordinator::new(Arc::new(host));
    coordinator.register_cache(remote_data.clone(), config.remote_data_budget());
    coordinator.register_cache(derived_data.clone(), config.derived_data_budget());
    coordinator.register_cache(images.clone(), config.image_cache_budget());
    coordinator.register_transient(session);

    let guard = MemoryGuard::builder()
        .budget(budget)
        .probe(Arc::new(ProcessMemoryProbe::new()))
        .coordinator(coordinator)
        .diagnostics(Arc::new(MetricsDiagnostics::new(metrics.clone(), logger.clone())))
        .config(config.guard_config())
        .build()
        .context("Failed to build memory guard")?;

    let caches: Vec<Arc<dyn EvictableCache>> = vec![remote_data, derived_data, images];
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        guard.subscribe(),
        guard.handle(),
        caches,
    ));

    let (shutdown_tx, _) = broadcast::channel(1);

    let health_handle = tokio::spawn(api::sync_health(
        guard.subscribe(),
        health_registry.clone(),
        shutdown_tx.subscribe(),
    ));
    let guard_handle = tokio::spawn(guard.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown_tx.subscribe()));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let exit_code = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            0
        }
        changed = reload_rx.changed() => {
            let reason = changed
                .ok()
                .and_then(|_| reload_rx.borrow().clone())
                .unwrap_or_else(|| "memory guard stopped".to_string());
            error!(reason = %reason, exit_code = RELOAD_EXIT_CODE, "Restarting after persistent memory emergency");
            RELOAD_EXIT_CODE
        }
    };

    let _ = shutdown_tx.send(());
    let _ = guard_handle.await;
    let _ = health_handle.await;
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    info!("Shutting down");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
