//! Static context blobs served by `context/get`.

use chrono::Utc;
use serde_json::{json, Value};

/// Context types with a dedicated blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    /// What this application is and what it is built with.
    Project,
    /// The CI/CD pipeline the demo walks through.
    Pipeline,
}

impl ContextType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "project" => Some(ContextType::Project),
            "pipeline" => Some(ContextType::Pipeline),
            _ => None,
        }
    }
}

/// Build the blob for `context_type`, falling back to a generic blob for
/// anything unrecognized. Nothing is remembered between calls.
pub fn context_blob(context_type: &str, query: Option<&str>) -> Value {
    let timestamp = Utc::now().to_rfc3339();
    match ContextType::parse(context_type) {
        Some(ContextType::Project) => json!({
            "type": "project",
            "query": query,
            "timestamp": timestamp,
            "data": {
                "name": "ollama-mcp-bridge",
                "description": "Demo service pairing a CI/CD tutorial with a local Ollama model server",
                "components": ["ollama client", "envelope client", "tool dispatch table"],
                "model_server": "ollama",
            },
        }),
        Some(ContextType::Pipeline) => json!({
            "type": "pipeline",
            "query": query,
            "timestamp": timestamp,
            "data": {
                "stages": ["lint", "test", "build", "deploy"],
                "triggers": ["push", "pull_request"],
                "environments": ["staging", "production"],
            },
        }),
        None => json!({
            "type": context_type,
            "query": query,
            "timestamp": timestamp,
            "data": {
                "message": format!("No specific context available for '{context_type}'"),
            },
        }),
    }
}
