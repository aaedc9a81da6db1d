//! Per-module liveness endpoints.

use axum::Json;

use crate::models::HealthResponse;

/// `GET /v1/auth/health`
pub async fn auth_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        module: "auth",
    })
}

/// `GET /v1/chat/health`
pub async fn chat_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        module: "chat",
    })
}
