//! Ollama Client: typed access to a local Ollama daemon.
//!
//! This module handles all communication with the model server:
//! - Model listing, lookup and health checks (`/api/tags`)
//! - One-shot and streamed generation (`/api/generate`, `/api/chat`)
//! - NDJSON stream aggregation with cancellation
//! - Model downloads (`/api/pull`)

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{OllamaClient, PullEndPolicy};
pub use errors::OllamaError;
pub use streaming::{PullOutcome, StreamAggregate};
pub use types::{
    ChatMessage, ChatRequest, GenerateRequest, GenerateResult, GenerationOptions,
    GenerationStats, ModelDescriptor, ModelDetails, PullProgress, Role,
};
