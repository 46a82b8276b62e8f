//! Static tool registry served by `tools/list`.
//!
//! The descriptors document each tool's arguments for callers that render
//! or pre-validate input. The handler itself does not enforce them.

use std::collections::BTreeMap;

use crate::mcp_client::types::{InputSchema, PropertySchema, ToolDescriptor};

/// Logical tool names.
pub const TOOL_GENERATE: &str = "ollama_generate";
pub const TOOL_CHAT: &str = "ollama_chat";
pub const TOOL_LIST_MODELS: &str = "ollama_list_models";
pub const TOOL_HEALTH_CHECK: &str = "ollama_health_check";

/// Every tool the dispatch table knows about, in listing order.
pub const TOOL_NAMES: [&str; 4] = [TOOL_GENERATE, TOOL_CHAT, TOOL_LIST_MODELS, TOOL_HEALTH_CHECK];

fn property(property_type: &str, description: &str) -> PropertySchema {
    PropertySchema {
        property_type: property_type.to_string(),
        description: description.to_string(),
    }
}

fn schema(properties: &[(&str, PropertySchema)], required: &[&str]) -> InputSchema {
    InputSchema {
        schema_type: "object".to_string(),
        properties: properties
            .iter()
            .map(|(name, prop)| (name.to_string(), prop.clone()))
            .collect::<BTreeMap<_, _>>(),
        required: if required.is_empty() {
            None
        } else {
            Some(required.iter().map(|r| r.to_string()).collect())
        },
    }
}

/// Build the tool descriptor list.
pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: TOOL_GENERATE.to_string(),
            description: "Generate a completion for a prompt with a local Ollama model".to_string(),
            input_schema: schema(
                &[
                    ("prompt", property("string", "The prompt to complete")),
                    ("model", property("string", "Model name (defaults to the configured model)")),
                    ("system", property("string", "Optional system prompt")),
                    ("options", property("object", "Sampling options such as temperature")),
                ],
                &["prompt"],
            ),
        },
        ToolDescriptor {
            name: TOOL_CHAT.to_string(),
            description: "Continue a chat conversation with a local Ollama model".to_string(),
            input_schema: schema(
                &[
                    (
                        "messages",
                        property("array", "Conversation so far as {role, content} objects"),
                    ),
                    ("model", property("string", "Model name (defaults to the configured model)")),
                    ("options", property("object", "Sampling options such as temperature")),
                ],
                &["messages"],
            ),
        },
        ToolDescriptor {
            name: TOOL_LIST_MODELS.to_string(),
            description: "List the models installed in the local Ollama daemon".to_string(),
            input_schema: schema(&[], &[]),
        },
        ToolDescriptor {
            name: TOOL_HEALTH_CHECK.to_string(),
            description: "Check whether the Ollama daemon is reachable".to_string(),
            input_schema: schema(&[], &[]),
        },
    ]
}

/// Look up one descriptor by name.
pub fn find_tool(name: &str) -> Option<ToolDescriptor> {
    tool_descriptors().into_iter().find(|t| t.name == name)
}
