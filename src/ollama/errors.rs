//! Ollama client error types.
//!
//! Each operation wraps the underlying [`TransportError`] so a log line or a
//! surfaced message names both what was being attempted and why it failed.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur while talking to the Ollama daemon.
#[derive(Debug, Error)]
pub enum OllamaError {
    /// The HTTP client could not be built.
    #[error("failed to initialise HTTP client: {0}")]
    Setup(#[source] TransportError),

    /// `GET /api/tags` failed.
    #[error("failed to list models: {0}")]
    ModelList(#[source] TransportError),

    /// `POST /api/generate` or `POST /api/chat` failed.
    #[error("generation failed: {0}")]
    Generation(#[source] TransportError),

    /// `POST /api/pull` failed before or while streaming.
    #[error("failed to pull model: {0}")]
    Pull(#[source] TransportError),

    /// The pull stream closed without a `success` frame and the configured
    /// policy treats that as a failure.
    #[error("pull of '{model}' ended without a success status")]
    PullIncomplete { model: String },

    /// Reading the response body failed mid-stream.
    #[error("stream error: {reason}")]
    Stream { reason: String },
}

impl OllamaError {
    /// The wrapped transport error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            OllamaError::Setup(e)
            | OllamaError::ModelList(e)
            | OllamaError::Generation(e)
            | OllamaError::Pull(e) => Some(e),
            _ => None,
        }
    }
}
