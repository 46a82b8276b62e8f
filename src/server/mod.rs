//! HTTP surface: the envelope endpoint plus thin Ollama passthrough routes.

pub mod routes;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::ollama::OllamaClient;

pub use routes::AppState;

/// Router with CORS and request tracing applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let ollama = OllamaClient::from_config(config).context("failed to build ollama client")?;
    let app = build_router(AppState::new(ollama, &config.api_key));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        ollama = %config.ollama_base_url,
        default_model = %config.default_model,
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
