//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the relay: the health
//! check, the WebSocket endpoint, the static client assets and the OpenAPI
//! document.

use crate::{
    handlers::{self, HealthResponse},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header::InvalidHeaderValue},
    routing::get,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health),
    components(schemas(HealthResponse)),
    tags(
        (name = "Chorus Relay", description = "Multi-agent streaming speech relay. Audio is streamed over the `/ws` WebSocket.")
    )
)]
pub struct ApiDoc;

/// Builds the CORS policy. `*` allows any origin; anything else must match exactly.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(HeaderValue::from_str(origin)?)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any))
}

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Result<Router, InvalidHeaderValue> {
    let cors = cors_layer(&app_state.config.cors_origin)?;
    let static_files = ServeDir::new(&app_state.config.static_dir);

    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    // Anything that is not an API route is served from the static asset root.
    Ok(api_router.fallback_service(static_files).layer(cors))
}
