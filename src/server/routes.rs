//! HTTP routes: the bearer-protected envelope endpoint, Ollama
//! passthroughs for models, health and pulls, and a liveness check.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::mcp_client::client::ENVELOPE_PATH;
use crate::mcp_client::types::EnvelopeReply;
use crate::mcp_server::McpHandler;
use crate::ollama::{OllamaClient, OllamaError};

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    handler: Arc<McpHandler>,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(ollama: OllamaClient, api_key: &str) -> Self {
        Self {
            handler: Arc::new(McpHandler::new(ollama)),
            api_key: Arc::from(api_key),
        }
    }

    pub fn handler(&self) -> &McpHandler {
        &self.handler
    }

    fn ollama(&self) -> &OllamaClient {
        self.handler.ollama()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == &*self.api_key)
    }
}

/// Create router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(ENVELOPE_PATH, post(envelope))
        .route("/api/ollama/models", get(list_models))
        .route("/api/ollama/health", get(ollama_health))
        .route("/api/ollama/pull", post(pull_model))
        .route("/health", get(health))
        .with_state(state)
}

/// POST /mcp/request - Envelope in, envelope reply out
///
/// Any JSON body is accepted; one that is not an envelope request comes
/// back as an `INVALID_REQUEST` error reply.
async fn envelope(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<EnvelopeReply>, AppError> {
    if !state.authorized(&headers) {
        tracing::warn!(id = %body["id"], method = %body["method"], "rejected envelope with bad token");
        return Err(AppError::Unauthorized);
    }
    Ok(Json(state.handler().handle_value(body).await))
}

/// GET /api/ollama/models - Installed models
async fn list_models(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let models = state.ollama().list_models().await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "models": models,
    })))
}

/// GET /api/ollama/health - Daemon reachability
async fn ollama_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let healthy = state.ollama().health_check().await;
    Json(serde_json::json!({
        "success": true,
        "healthy": healthy,
    }))
}

#[derive(Debug, Deserialize)]
struct PullBody {
    name: String,
}

/// POST /api/ollama/pull - Download a model
async fn pull_model(
    State(state): State<AppState>,
    Json(body): Json<PullBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.ollama().pull_model(&body.name).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Model {} pulled successfully", body.name),
    })))
}

/// GET /health - Liveness
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Error type for route handlers
enum AppError {
    Unauthorized,
    Ollama(OllamaError),
}

impl From<OllamaError> for AppError {
    fn from(err: OllamaError) -> Self {
        AppError::Ollama(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid or missing bearer token".to_string()),
            AppError::Ollama(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
