//! StatusWatch - Endpoint and Log Monitoring Service
//!
//! Probes a set of HTTP endpoints and inspects a log file on a cron cadence,
//! records each cycle as a snapshot, and serves the history over HTTP.

mod config;
mod db;
mod logcheck;
mod probe;
mod scheduler;
mod status;
mod web;

#[cfg(test)]
mod testing;

use config::{ConfigHandle, MonitorConfig, ServerConfig};
use db::{SnapshotStore, Store};
use logcheck::FileLogInspector;
use probe::ReqwestTransport;
use scheduler::{MonitoringCycle, RetentionCycle, Scheduler};
use web::{AppState, RateLimiter, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statuswatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    let monitor = MonitorConfig::load(&cfg.config_path).unwrap_or_else(|e| {
        tracing::error!("Error loading configuration: {}, using defaults", e);
        MonitorConfig::default()
    });
    let port = cfg.http_port.unwrap_or(monitor.port);
    tracing::info!("Starting StatusWatch on port {}...", port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store: Arc<dyn SnapshotStore> = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let config = ConfigHandle::new(monitor.clone(), cfg.config_path.clone());

    // Create scheduler
    let cycle = MonitoringCycle::new(
        config.clone(),
        Arc::new(ReqwestTransport::new()?),
        Arc::new(FileLogInspector::new()),
        store.clone(),
    );
    let scheduler = Arc::new(Scheduler::new(cycle, RetentionCycle::new(store.clone())));

    // Start scheduler; the first cycle runs while the server comes up
    tokio::spawn({
        let scheduler = scheduler.clone();
        async move {
            if let Err(e) = scheduler
                .start(&monitor.ping_interval, monitor.data_retention_days)
                .await
            {
                tracing::error!("Failed to start scheduler: {}", e);
            }
        }
    });

    // Start web server
    let server = Server::new(
        AppState {
            config,
            store,
            scheduler: scheduler.clone(),
        },
        RateLimiter::new(cfg.rate_limit_max, cfg.rate_limit_window),
    );
    server.start(port, shutdown_signal()).await?;

    scheduler.stop();
    tracing::info!("Server shut down successfully");

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping");
}
