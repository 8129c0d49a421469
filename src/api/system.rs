//! Unauthenticated service endpoints: health check and endpoint index.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{AppState, HealthResponse, ServiceIndex};

/// `GET /health`
///
/// Reports 503 when the store does not answer a ping in time.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "connected",
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
                .into_response()
        }
    }
}

/// `GET /`
pub async fn index() -> Json<ServiceIndex> {
    Json(ServiceIndex {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "GET /health",
            "POST /api/auth/login",
            "GET /api/auth/verify",
            "GET /api/auth/me",
            "POST /api/auth/change-password",
            "GET /api/users",
            "POST /api/users",
            "PUT /api/users/{id}",
            "DELETE /api/users/{id}",
            "ANY /api/jellyfin/{*path}",
            "ANY /api/tmdb/{*path}",
            "ANY /api/radarr/{*path}",
            "ANY /api/sonarr/{*path}",
            "GET /api/metrics",
        ],
    })
}
