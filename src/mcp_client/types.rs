//! Envelope wire schema.
//!
//! Single source of truth for the `/mcp/request` contract: the client
//! serializes [`EnvelopeRequest`] and decodes [`EnvelopeReply`], the server
//! does the reverse. Replies are a tagged variant so the `type` field is
//! checked before `result` or `error` is touched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Envelope ────────────────────────────────────────────────────────────────

/// Message kind carried in the `type` field of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Request,
}

/// Outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl EnvelopeRequest {
    /// Build a request with a fresh id.
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            id: new_request_id(),
            kind: RequestKind::Request,
            method: method.to_string(),
            params,
        }
    }
}

/// Reply envelope: either a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EnvelopeReply {
    Response {
        id: String,
        result: serde_json::Value,
    },
    Error {
        id: String,
        error: EnvelopeError,
    },
}

impl EnvelopeReply {
    pub fn id(&self) -> &str {
        match self {
            EnvelopeReply::Response { id, .. } | EnvelopeReply::Error { id, .. } => id,
        }
    }
}

/// Error object carried by an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: i32,
    pub message: String,
}

/// Generate a request id.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

// ─── Tools ───────────────────────────────────────────────────────────────────

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// JSON-schema subset used for tool inputs. Advisory only: the handler does
/// not enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Always `"object"`.
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub property_type: String,
    pub description: String,
}

/// `tools/list` result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolList {
    pub tools: Vec<ToolDescriptor>,
}

/// `tools/call` result payload.
///
/// Tool failures are reported here with `success = false` rather than as
/// an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Tool-specific fields, flattened into the top level.
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallResult {
    pub fn ok(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            error: None,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            timestamp: Utc::now(),
            data: serde_json::Map::new(),
        }
    }
}

// ─── Standard Error Codes ────────────────────────────────────────────────────

/// JSON-RPC style error codes used in error replies.
pub mod error_codes {
    /// The JSON sent is not a valid envelope.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters (including unknown tool names).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────
