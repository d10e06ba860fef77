//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, instrument, warn};

use crate::error::{Error, StatusClass};
use crate::manifest::ManifestDocument;
use crate::workflow::{Orchestrator, WorkflowSummary};

use super::dto::{CreateAppRequest, DcsConnectRequest, DeleteAppRequest, ErrorResponse, HealthResponse};

/// Error rendered as `{error, message}` with a status from its class
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.status_class() {
            StatusClass::NotFound => StatusCode::NOT_FOUND,
            StatusClass::BadRequest => StatusCode::BAD_REQUEST,
            StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(kind = self.0.kind(), "Request failed: {}", self.0);
        } else {
            warn!(kind = self.0.kind(), "Request rejected: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse::new(self.0.kind(), &self.0.to_string())),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn hello() -> &'static str {
    "Hello Dapr K8s!"
}

#[instrument(skip(state, request), fields(dcs_name = %request.dcs.dcs_name))]
pub async fn create_app(
    State(state): State<Arc<Orchestrator>>,
    Json(request): Json<CreateAppRequest>,
) -> ApiResult<WorkflowSummary> {
    let cache = request.dcs.decode()?;
    let manifest = ManifestDocument::from_value(request.deployment)?;
    Ok(Json(state.create_app(manifest, cache).await?))
}

#[instrument(skip(state))]
pub async fn delete_app(
    State(state): State<Arc<Orchestrator>>,
    Json(request): Json<DeleteAppRequest>,
) -> ApiResult<WorkflowSummary> {
    Ok(Json(state.delete_app(&request.namespace, &request.name).await?))
}

#[instrument(skip(state, request), fields(dcs_name = %request.dcs_name))]
pub async fn connect_cache(
    State(state): State<Arc<Orchestrator>>,
    Json(request): Json<DcsConnectRequest>,
) -> ApiResult<WorkflowSummary> {
    let cache = request.decode()?;
    Ok(Json(state.connect_cache(cache).await?))
}

#[instrument(skip(state))]
pub async fn disconnect_cache(State(state): State<Arc<Orchestrator>>) -> ApiResult<WorkflowSummary> {
    Ok(Json(state.disconnect_cache().await?))
}

/// Prometheus text exposition
#[cfg(feature = "metrics")]
pub async fn metrics() -> Response {
    match crate::metrics::encode_registry() {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
