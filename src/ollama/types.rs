//! Wire types for the Ollama HTTP API.
//!
//! Field names follow Ollama's snake_case JSON. Timing counters only appear
//! on terminal frames, so they are all optional and skipped when absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Models ──────────────────────────────────────────────────────────────────

/// A model as reported by `GET /api/tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// Size on disk, in bytes.
    #[serde(default)]
    pub size: u64,
    /// Absent on sparse entries from older daemons.
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub details: ModelDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
    #[serde(default)]
    pub parent_model: String,
    /// Ollama sends `null` here for some single-family models.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub families: Vec<String>,
}

/// Body of `GET /api/tags`. `models` stays `None` when the field is absent
/// or null.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Option<Vec<ModelDescriptor>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sampling options forwarded verbatim under `options`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

/// Request body for `POST /api/generate`.
///
/// `stream` is overwritten by the client depending on which method is
/// called, so callers can leave it at the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: false,
            system: None,
            options: None,
        }
    }
}

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            options: None,
        }
    }
}

// ─── Responses ───────────────────────────────────────────────────────────────

/// Timing and token counters. Present only on terminal frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

/// Result of a generate or chat call, and the shape of every streamed frame.
///
/// For streamed frames `response` carries only the incremental fragment;
/// for the aggregate it carries the full text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    #[serde(default)]
    pub model: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    /// Token context for follow-up generate calls (generate only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(flatten)]
    pub stats: GenerationStats,
}

/// Raw `/api/chat` frame. Reshaped into [`GenerateResult`] before leaving
/// the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<ChatResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(flatten)]
    pub stats: GenerationStats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: String,
}

impl From<ChatResponse> for GenerateResult {
    fn from(chat: ChatResponse) -> Self {
        GenerateResult {
            model: chat.model,
            created_at: chat.created_at,
            response: chat.message.map(|m| m.content).unwrap_or_default(),
            done: chat.done,
            context: None,
            stats: chat.stats,
        }
    }
}

/// One progress line from `POST /api/pull`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
}

impl PullProgress {
    /// Whether this frame marks a finished pull.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_response_null_models() {
        let tags: TagsResponse = serde_json::from_str(r#"{"models": null}"#).unwrap();
        assert!(tags.models.is_none());
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(tags.models.is_none());
        let tags: TagsResponse = serde_json::from_str(r#"{"models": []}"#).unwrap();
        assert_eq!(tags.models.map(|m| m.len()), Some(0));
    }

    #[test]
    fn test_model_descriptor_from_ollama_json() {
        let json = r#"{
            "name": "llama3.2:latest",
            "modified_at": "2024-10-01T12:30:00.123456789-07:00",
            "size": 2019393189,
            "digest": "a80c4f17acd5",
            "details": {
                "parent_model": "",
                "format": "gguf",
                "family": "llama",
                "families": null,
                "parameter_size": "3.2B",
                "quantization_level": "Q4_K_M"
            }
        }"#;
        let model: ModelDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(model.name, "llama3.2:latest");
        assert_eq!(model.size, 2_019_393_189);
        assert!(model.details.families.is_empty());
        assert_eq!(model.details.quantization_level, "Q4_K_M");
    }

    #[test]
    fn test_stats_omitted_when_none() {
        let result = GenerateResult {
            model: "m".into(),
            created_at: Utc::now(),
            response: "hi".into(),
            done: false,
            context: None,
            stats: GenerationStats::default(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("eval_count"));
        assert!(!json.contains("context"));
    }

    #[test]
    fn test_terminal_frame_carries_stats() {
        let json = r#"{"model":"m","created_at":"2024-01-01T00:00:00Z","response":"",
            "done":true,"total_duration":100,"eval_count":7}"#;
        let frame: GenerateResult = serde_json::from_str(json).unwrap();
        assert!(frame.done);
        assert_eq!(frame.stats.total_duration, Some(100));
        assert_eq!(frame.stats.eval_count, Some(7));
        assert!(frame.stats.load_duration.is_none());
    }

    #[test]
    fn test_chat_response_reshaped_into_flat_result() {
        let json = r#"{"model":"m","created_at":"2024-01-01T00:00:00Z",
            "message":{"role":"assistant","content":"hello"},
            "done":true,"eval_duration":42}"#;
        let chat: ChatResponse = serde_json::from_str(json).unwrap();
        let result = GenerateResult::from(chat);
        assert_eq!(result.response, "hello");
        assert_eq!(result.stats.eval_duration, Some(42));
        assert!(result.done);
    }

    #[test]
    fn test_options_omitted_from_request_when_none() {
        let req = GenerateRequest::new("m", "p");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("options"));
        assert!(!json.contains("system"));
        assert!(json.contains("\"stream\":false"));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::new(Role::Assistant, "ok");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
