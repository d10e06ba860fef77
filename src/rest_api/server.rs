//! Axum HTTP server for the REST API

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::workflow::Orchestrator;
use crate::{Error, Result};

use super::handlers;

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api", get(handlers::hello))
        .route("/api/", get(handlers::hello))
        .route("/api/kubectl/create", post(handlers::create_app))
        .route("/api/kubectl/delete", post(handlers::delete_app))
        .route("/api/kubectl/connect", post(handlers::connect_cache))
        .route("/api/kubectl/disconnect", post(handlers::disconnect_cache));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(handlers::metrics));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    )
    .with_state(orchestrator)
}

/// Run the REST API server until Ctrl-C.
pub async fn run_server(orchestrator: Arc<Orchestrator>, addr: SocketAddr) -> Result<()> {
    let app = router(orchestrator);

    info!("REST API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

    Ok(())
}
