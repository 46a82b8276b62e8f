//! Ollama HTTP client.
//!
//! Typed façade over the daemon's native API: model listing, health,
//! one-shot and streamed generate/chat, and model pulls. Streamed calls are
//! consumed through [`super::streaming`], which owns the aggregation rules.

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::errors::OllamaError;
use super::streaming::{
    consume_generation_stream, consume_pull_stream, parse_chat_frame, parse_generate_frame,
    PullOutcome,
};
use super::types::{
    ChatRequest, ChatResponse, GenerateRequest, GenerateResult, ModelDescriptor, PullProgress,
    TagsResponse,
};
use crate::config::AppConfig;
use crate::transport::{HttpTransport, TransportError};

// ─── Pull policy ─────────────────────────────────────────────────────────────

/// What `pull_model` does when the stream closes without a `success` frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullEndPolicy {
    /// Treat the pull as finished.
    #[default]
    Succeed,
    /// Report [`OllamaError::PullIncomplete`].
    Fail,
}

impl std::str::FromStr for PullEndPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "succeed" | "success" => Ok(PullEndPolicy::Succeed),
            "fail" | "error" => Ok(PullEndPolicy::Fail),
            other => Err(format!("unknown pull end policy '{other}'")),
        }
    }
}

/// A read failure after the stream opened is reported under the operation
/// that opened it, the same as a failure before the first byte.
fn stream_failure(err: OllamaError, url: &str, wrap: fn(TransportError) -> OllamaError) -> OllamaError {
    match err {
        OllamaError::Stream { reason } => wrap(TransportError::Network {
            url: url.to_string(),
            reason,
        }),
        other => other,
    }
}

// ─── OllamaClient ────────────────────────────────────────────────────────────

/// Client for a single Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    transport: HttpTransport,
    base_url: String,
    default_model: String,
    pull_end_policy: PullEndPolicy,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Result<Self, OllamaError> {
        let transport = HttpTransport::new().map_err(OllamaError::Setup)?;
        Ok(Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            pull_end_policy: PullEndPolicy::default(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, OllamaError> {
        Ok(Self::new(&config.ollama_base_url, &config.default_model)?
            .with_pull_end_policy(config.pull_end_policy))
    }

    pub fn with_pull_end_policy(mut self, policy: PullEndPolicy) -> Self {
        self.pull_end_policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Model used when a request does not name one.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn fetch_tags<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        self.transport
            .request_json::<T, ()>(
                Method::GET,
                &self.url("/api/tags"),
                HeaderMap::new(),
                None,
            )
            .await
    }

    // ─── Models ──────────────────────────────────────────────────────────

    /// Whether the daemon is reachable and answers `/api/tags` with a model
    /// collection. Only the presence of `models` is checked, so one odd entry
    /// cannot make a live daemon look down. Never fails.
    pub async fn health_check(&self) -> bool {
        match self.fetch_tags::<serde_json::Value>().await {
            Ok(body) => body.get("models").is_some_and(|m| !m.is_null()),
            Err(e) => {
                tracing::debug!(url = %self.base_url, error = %e, "ollama health check failed");
                false
            }
        }
    }

    /// List locally available models.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, OllamaError> {
        match self.fetch_tags::<TagsResponse>().await {
            Ok(tags) => Ok(tags.models.unwrap_or_default()),
            Err(e) => {
                tracing::error!(url = %self.base_url, error = %e, "failed to list ollama models");
                Err(OllamaError::ModelList(e))
            }
        }
    }

    /// Look up a model by exact name. Listing failures are logged and
    /// reported as "not found".
    pub async fn get_model(&self, name: &str) -> Option<ModelDescriptor> {
        match self.list_models().await {
            Ok(models) => models.into_iter().find(|m| m.name == name),
            Err(e) => {
                tracing::warn!(model = %name, error = %e, "model lookup failed");
                None
            }
        }
    }

    // ─── Generation (non-streaming) ──────────────────────────────────────

    /// One-shot completion via `POST /api/generate`.
    pub async fn generate(&self, mut request: GenerateRequest) -> Result<GenerateResult, OllamaError> {
        request.stream = false;
        tracing::info!(model = %request.model, prompt_len = request.prompt.len(), "generate request");

        self.transport
            .request_json::<GenerateResult, _>(
                Method::POST,
                &self.url("/api/generate"),
                HeaderMap::new(),
                Some(&request),
            )
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "generate failed");
                OllamaError::Generation(e)
            })
    }

    /// One-shot chat via `POST /api/chat`, reshaped into the flat result.
    pub async fn chat(&self, mut request: ChatRequest) -> Result<GenerateResult, OllamaError> {
        request.stream = false;
        tracing::info!(
            model = %request.model,
            message_count = request.messages.len(),
            "chat request"
        );

        self.transport
            .request_json::<ChatResponse, _>(
                Method::POST,
                &self.url("/api/chat"),
                HeaderMap::new(),
                Some(&request),
            )
            .await
            .map(GenerateResult::from)
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "chat failed");
                OllamaError::Generation(e)
            })
    }

    // ─── Generation (streaming) ──────────────────────────────────────────

    /// Streamed completion. `on_frame` receives each fragment as it arrives;
    /// the return value carries the full text and the terminal statistics.
    pub async fn generate_stream<F>(
        &self,
        mut request: GenerateRequest,
        cancel: Option<&CancellationToken>,
        on_frame: F,
    ) -> Result<GenerateResult, OllamaError>
    where
        F: FnMut(&GenerateResult),
    {
        request.stream = true;
        tracing::info!(model = %request.model, prompt_len = request.prompt.len(), "generate stream request");

        let response = self
            .transport
            .open_stream(&self.url("/api/generate"), &request)
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "generate stream failed");
                OllamaError::Generation(e)
            })?;

        let stream = Box::pin(response.bytes_stream());
        let aggregate = consume_generation_stream(stream, parse_generate_frame, cancel, on_frame)
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "generate stream interrupted");
                stream_failure(e, &self.url("/api/generate"), OllamaError::Generation)
            })?;
        Ok(aggregate.finish(&request.model))
    }

    /// Streamed chat; frames are reshaped into the generate shape.
    pub async fn chat_stream<F>(
        &self,
        mut request: ChatRequest,
        cancel: Option<&CancellationToken>,
        on_frame: F,
    ) -> Result<GenerateResult, OllamaError>
    where
        F: FnMut(&GenerateResult),
    {
        request.stream = true;
        tracing::info!(
            model = %request.model,
            message_count = request.messages.len(),
            "chat stream request"
        );

        let response = self
            .transport
            .open_stream(&self.url("/api/chat"), &request)
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "chat stream failed");
                OllamaError::Generation(e)
            })?;

        let stream = Box::pin(response.bytes_stream());
        let aggregate = consume_generation_stream(stream, parse_chat_frame, cancel, on_frame)
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "chat stream interrupted");
                stream_failure(e, &self.url("/api/chat"), OllamaError::Generation)
            })?;
        Ok(aggregate.finish(&request.model))
    }

    // ─── Pull ────────────────────────────────────────────────────────────

    /// Download a model. Returns once a `success` frame is seen.
    pub async fn pull_model(&self, name: &str) -> Result<(), OllamaError> {
        self.pull_model_with_progress(name, |_| {}).await
    }

    /// Download a model, forwarding every progress frame.
    pub async fn pull_model_with_progress<F>(&self, name: &str, on_progress: F) -> Result<(), OllamaError>
    where
        F: FnMut(&PullProgress),
    {
        tracing::info!(model = %name, "pull request");
        let body = serde_json::json!({ "name": name });

        let response = self
            .transport
            .open_stream(&self.url("/api/pull"), &body)
            .await
            .map_err(|e| {
                tracing::error!(model = %name, error = %e, "pull failed");
                OllamaError::Pull(e)
            })?;

        let stream = Box::pin(response.bytes_stream());
        let outcome = consume_pull_stream(stream, on_progress).await.map_err(|e| {
            tracing::error!(model = %name, error = %e, "pull stream interrupted");
            stream_failure(e, &self.url("/api/pull"), OllamaError::Pull)
        })?;
        match outcome {
            PullOutcome::Succeeded => {
                tracing::info!(model = %name, "pull completed");
                Ok(())
            }
            PullOutcome::StreamEnded => match self.pull_end_policy {
                PullEndPolicy::Succeed => {
                    tracing::warn!(model = %name, "pull stream ended without success status");
                    Ok(())
                }
                PullEndPolicy::Fail => {
                    tracing::error!(model = %name, "pull stream ended without success status");
                    Err(OllamaError::PullIncomplete {
                        model: name.to_string(),
                    })
                }
            },
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
