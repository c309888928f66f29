//! Main Entrypoint for the Chorus Relay Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Building the provider connector and the session manager.
//! 4. Constructing the Axum router with its middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use chorus_api::{
    config::Config,
    router::create_router,
    state::AppState,
    ws::{SessionManager, channel::ChannelTimeouts, provider::elevenlabs::ElevenLabsConnector},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

/// Resolves on `Ctrl+C` or, on Unix, `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing relay...");

    // --- 3. Initialize the Relay ---
    let connector = Arc::new(ElevenLabsConnector::new(
        config.provider_url.clone(),
        config.api_key.clone(),
    ));
    let sessions = Arc::new(SessionManager::new(
        Arc::new(config.agents.clone()),
        connector,
        ChannelTimeouts {
            connect: config.connect_timeout,
            idle: config.idle_timeout,
        },
    ));
    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        sessions: sessions.clone(),
    });

    // --- 4. Create Router ---
    let app = create_router(app_state).context("Invalid CORS_ORIGIN")?;

    // --- 5. Start Server ---
    info!(
        environment = %config.environment,
        agents = ?config.agents.ids().collect::<Vec<_>>(),
        static_dir = %config.static_dir.display(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    let shutdown_sessions = sessions.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Upgraded WebSocket connections are not drained by the server itself.
        shutdown_sessions.shutdown().await;
    })
    .await?;

    sessions.shutdown().await;
    info!("Server has shut down.");
    Ok(())
}
