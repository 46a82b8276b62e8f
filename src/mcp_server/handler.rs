//! Envelope request handler: the tool dispatch table.
//!
//! Maps envelope methods to operations:
//! - `tools/list`  → static registry
//! - `tools/call`  → one of four Ollama-backed tools
//! - `context/get` → static context blobs
//!
//! Tool failures are caught here and returned as `success = false` results,
//! so one failing tool never turns into a transport-level error.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::context::context_blob;
use super::errors::HandlerError;
use super::registry::{
    tool_descriptors, TOOL_CHAT, TOOL_GENERATE, TOOL_HEALTH_CHECK, TOOL_LIST_MODELS,
};
use crate::mcp_client::types::{EnvelopeError, EnvelopeReply, EnvelopeRequest, ToolCallResult, ToolList};
use crate::ollama::{ChatMessage, ChatRequest, GenerateRequest, GenerationOptions, OllamaClient};

// ─── Params ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ContextParams {
    #[serde(rename = "type")]
    context_type: String,
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateArgs {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    options: Option<GenerationOptions>,
}

#[derive(Debug, Deserialize)]
struct ChatArgs {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    options: Option<GenerationOptions>,
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Option<Value>) -> Result<T, HandlerError> {
    let params = params.ok_or_else(|| HandlerError::InvalidParams {
        reason: "missing params".into(),
    })?;
    serde_json::from_value(params).map_err(|e| HandlerError::InvalidParams {
        reason: e.to_string(),
    })
}

/// Tool arguments arrive as `null` when omitted.
fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, String> {
    let arguments = if arguments.is_null() {
        Value::Object(Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))
}

fn into_map<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>, String> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("tool produced a non-object result".into()),
        Err(e) => Err(format!("failed to serialize tool result: {e}")),
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::Internal {
        reason: format!("failed to serialize result: {e}"),
    })
}

// ─── McpHandler ──────────────────────────────────────────────────────────────

/// Server-side dispatcher for envelope requests.
#[derive(Debug, Clone)]
pub struct McpHandler {
    ollama: OllamaClient,
}

impl McpHandler {
    pub fn new(ollama: OllamaClient) -> Self {
        Self { ollama }
    }

    pub fn ollama(&self) -> &OllamaClient {
        &self.ollama
    }

    /// Dispatch one method call.
    pub async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, HandlerError> {
        match method {
            "tools/list" => to_result(&ToolList {
                tools: tool_descriptors(),
            }),
            "tools/call" => {
                let call: CallParams = parse_params(params)?;
                let result = self.call_tool(&call.name, call.arguments).await?;
                to_result(&result)
            }
            "context/get" => {
                let ctx: ContextParams = parse_params(params)?;
                Ok(context_blob(&ctx.context_type, ctx.query.as_deref()))
            }
            other => Err(HandlerError::UnknownMethod {
                method: other.to_string(),
            }),
        }
    }

    /// Dispatch a full envelope and wrap the outcome in a reply.
    pub async fn handle_envelope(&self, request: EnvelopeRequest) -> EnvelopeReply {
        tracing::info!(id = %request.id, method = %request.method, "envelope request");
        match self.handle(&request.method, request.params).await {
            Ok(result) => EnvelopeReply::Response {
                id: request.id,
                result,
            },
            Err(e) => {
                tracing::warn!(id = %request.id, method = %request.method, error = %e, "envelope request rejected");
                EnvelopeReply::Error {
                    id: request.id,
                    error: EnvelopeError {
                        code: e.code(),
                        message: e.to_string(),
                    },
                }
            }
        }
    }

    /// Dispatch a raw JSON body. A body that is not an envelope request
    /// gets an `INVALID_REQUEST` error reply, echoing its `id` when one
    /// is readable.
    pub async fn handle_value(&self, body: Value) -> EnvelopeReply {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<EnvelopeRequest>(body) {
            Ok(request) => self.handle_envelope(request).await,
            Err(e) => {
                let err = HandlerError::InvalidRequest {
                    reason: e.to_string(),
                };
                tracing::warn!(id = %id, error = %err, "malformed envelope");
                EnvelopeReply::Error {
                    id,
                    error: EnvelopeError {
                        code: err.code(),
                        message: err.to_string(),
                    },
                }
            }
        }
    }

    // ─── Tools ───────────────────────────────────────────────────────────

    /// Run a tool. Only an unknown tool name is an error; everything the
    /// tool itself does wrong becomes a `success = false` result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, HandlerError> {
        let outcome = match name {
            TOOL_GENERATE => self.tool_generate(arguments).await,
            TOOL_CHAT => self.tool_chat(arguments).await,
            TOOL_LIST_MODELS => self.tool_list_models().await,
            TOOL_HEALTH_CHECK => self.tool_health_check().await,
            other => {
                return Err(HandlerError::UnknownTool {
                    name: other.to_string(),
                })
            }
        };

        Ok(match outcome {
            Ok(data) => ToolCallResult::ok(data),
            Err(message) => {
                tracing::warn!(tool = %name, error = %message, "tool call failed");
                ToolCallResult::failed(message)
            }
        })
    }

    async fn tool_generate(&self, arguments: Value) -> Result<Map<String, Value>, String> {
        let args: GenerateArgs = parse_args(arguments)?;
        let model = args
            .model
            .unwrap_or_else(|| self.ollama.default_model().to_string());

        let mut request = GenerateRequest::new(model, args.prompt);
        request.system = args.system;
        request.options = args.options;

        let result = self.ollama.generate(request).await.map_err(|e| e.to_string())?;
        into_map(&result)
    }

    async fn tool_chat(&self, arguments: Value) -> Result<Map<String, Value>, String> {
        let args: ChatArgs = parse_args(arguments)?;
        let model = args
            .model
            .unwrap_or_else(|| self.ollama.default_model().to_string());

        let mut request = ChatRequest::new(model, args.messages);
        request.options = args.options;

        let result = self.ollama.chat(request).await.map_err(|e| e.to_string())?;
        into_map(&result)
    }

    async fn tool_list_models(&self) -> Result<Map<String, Value>, String> {
        let models = self.ollama.list_models().await.map_err(|e| e.to_string())?;
        let mut data = Map::new();
        data.insert("count".into(), Value::from(models.len()));
        data.insert(
            "models".into(),
            serde_json::to_value(models).map_err(|e| e.to_string())?,
        );
        Ok(data)
    }

    async fn tool_health_check(&self) -> Result<Map<String, Value>, String> {
        let healthy = self.ollama.health_check().await;
        let mut data = Map::new();
        data.insert("healthy".into(), Value::Bool(healthy));
        data.insert("url".into(), Value::from(self.ollama.base_url()));
        Ok(data)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
