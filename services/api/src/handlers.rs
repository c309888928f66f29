//! Axum Handlers for the HTTP API
//!
//! The relay's HTTP surface is small: a liveness check next to the WebSocket
//! endpoint. Handlers carry `utoipa` annotations for the OpenAPI document.

use axum::response::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Liveness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving requests.
    pub status: String,
    /// Server time in RFC 3339.
    pub timestamp: String,
}

/// Report that the relay is up.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "The relay is running", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
