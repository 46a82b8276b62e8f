//! Envelope server side: the dispatch table behind `/mcp/request`.
//!
//! - `tools/list`  → the static tool registry
//! - `tools/call`  → Ollama-backed tools, failures absorbed into the result
//! - `context/get` → static context blobs

pub mod context;
pub mod errors;
pub mod handler;
pub mod registry;

pub use context::{context_blob, ContextType};
pub use errors::HandlerError;
pub use handler::McpHandler;
pub use registry::{find_tool, tool_descriptors, TOOL_NAMES};
