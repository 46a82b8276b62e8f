//! Dispatch table error types.

use thiserror::Error;

use crate::mcp_client::types::error_codes;

/// Errors the handler reports as envelope error replies.
///
/// Tool execution failures are not here: they are absorbed into a
/// `success = false` tool result.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("unknown method: '{method}'")]
    UnknownMethod { method: String },

    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    #[error("invalid params: {reason}")]
    InvalidParams { reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl HandlerError {
    /// Error code used in the envelope error reply.
    pub fn code(&self) -> i32 {
        match self {
            HandlerError::UnknownMethod { .. } => error_codes::METHOD_NOT_FOUND,
            HandlerError::UnknownTool { .. } | HandlerError::InvalidParams { .. } => {
                error_codes::INVALID_PARAMS
            }
            HandlerError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            HandlerError::Internal { .. } => error_codes::INTERNAL_ERROR,
        }
    }
}
