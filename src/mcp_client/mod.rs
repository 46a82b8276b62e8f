//! Envelope Client: request/response envelopes over HTTP.
//!
//! This module handles:
//! - The shared wire schema for `/mcp/request` (requests, tagged replies,
//!   tool descriptors, tool call results)
//! - Bearer-authenticated envelope exchange
//! - Typed `tools/list`, `tools/call` and `context/get` helpers
//!
//! The server half in [`crate::mcp_server`] uses the same types, so the two
//! sides cannot drift apart.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::McpClient;
pub use errors::McpError;
pub use types::{
    EnvelopeError, EnvelopeReply, EnvelopeRequest, InputSchema, PropertySchema, ToolCallResult,
    ToolDescriptor, ToolList,
};
