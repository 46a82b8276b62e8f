//! Envelope client: talks to the `/mcp/request` endpoint.
//!
//! Every call is a single fire-and-await exchange carrying a fresh id and the
//! bearer token. Reply ids are not matched against request ids.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;

use super::errors::McpError;
use super::types::{EnvelopeReply, EnvelopeRequest, ToolCallResult, ToolDescriptor, ToolList};
use crate::config::AppConfig;
use crate::transport::HttpTransport;

/// Path of the envelope endpoint, relative to the base URL.
pub const ENVELOPE_PATH: &str = "/mcp/request";

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Client for the envelope endpoint.
#[derive(Debug, Clone)]
pub struct McpClient {
    transport: HttpTransport,
    endpoint: String,
    api_key: String,
}

impl McpClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, McpError> {
        Ok(Self {
            transport: HttpTransport::new()?,
            endpoint: format!("{}{ENVELOPE_PATH}", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, McpError> {
        Self::new(&config.mcp_base_url, &config.api_key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "api key is not a valid header value, sending without it");
            }
        }
        headers
    }

    // ─── Send ────────────────────────────────────────────────────────────

    /// Send one envelope and return the decoded reply as-is.
    pub async fn send(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<EnvelopeReply, McpError> {
        let request = EnvelopeRequest::new(method, params);
        tracing::debug!(id = %request.id, method = %method, "sending envelope");

        self.transport
            .request_json::<EnvelopeReply, _>(
                Method::POST,
                &self.endpoint,
                self.auth_headers(),
                Some(&request),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    id = %request.id,
                    method = %method,
                    endpoint = %self.endpoint,
                    error = %e,
                    "envelope request failed"
                );
                McpError::Transport(e)
            })
    }

    /// Send and unwrap a `response` reply into `T`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T, McpError> {
        match self.send(method, params).await? {
            EnvelopeReply::Response { result, .. } => {
                serde_json::from_value(result).map_err(|e| McpError::UnexpectedResult {
                    method: method.to_string(),
                    reason: e.to_string(),
                })
            }
            EnvelopeReply::Error { id, error } => {
                tracing::warn!(
                    id = %id,
                    method = %method,
                    code = error.code,
                    message = %error.message,
                    "envelope error reply"
                );
                Err(McpError::ServerError {
                    code: error.code,
                    message: error.message,
                })
            }
        }
    }

    // ─── Operations ──────────────────────────────────────────────────────

    /// `tools/list`: the advertised tool descriptors.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let list: ToolList = self.call("tools/list", None).await?;
        Ok(list.tools)
    }

    /// `tools/call`: run a tool. Tool-level failures come back as
    /// `success = false`, not as `Err`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        self.call("tools/call", Some(params)).await
    }

    /// `context/get`: fetch a context blob.
    pub async fn get_context(
        &self,
        context_type: &str,
        query: Option<&str>,
    ) -> Result<serde_json::Value, McpError> {
        let params = serde_json::json!({
            "type": context_type,
            "query": query,
        });
        self.call("context/get", Some(params)).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
