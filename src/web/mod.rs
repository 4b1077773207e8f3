//! Web server module.

mod handlers;
mod rate_limit;

pub use rate_limit::*;

use crate::config::ConfigHandle;
use crate::db::SnapshotStore;
use crate::scheduler::Scheduler;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ConfigHandle,
    pub store: Arc<dyn SnapshotStore>,
    pub scheduler: Arc<Scheduler>,
}

/// Web server for StatusWatch.
pub struct Server {
    state: AppState,
    limiter: Arc<RateLimiter>,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(state: AppState, limiter: RateLimiter) -> Self {
        Self {
            state,
            limiter: Arc::new(limiter),
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/", get(handlers::handle_root))
            // Latest snapshot views
            .route("/api/pingstatus", get(handlers::handle_ping_status))
            .route("/api/steadystatus", get(handlers::handle_steady_status))
            .route("/api/fullstatus", get(handlers::handle_full_status))
            // History
            .route("/api/pinglist", get(handlers::handle_ping_list))
            .route("/api/steadylist", get(handlers::handle_steady_list))
            // Operations
            .route("/api/health", get(handlers::handle_health))
            .route("/api/dashboard", get(handlers::handle_dashboard))
            .route(
                "/api/config",
                get(handlers::handle_get_config).put(handlers::handle_update_config),
            )
            .fallback(handlers::handle_not_found)
            .layer(middleware::from_fn_with_state(
                self.limiter.clone(),
                rate_limit::rate_limit,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Serve on `port` until `shutdown` resolves.
    pub async fn start<F>(
        &self,
        port: u16,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        Ok(())
    }
}
