//! Envelope client error types.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur during envelope client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The HTTP exchange with the envelope endpoint failed.
    #[error("envelope transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with an error reply.
    #[error("server error [{code}]: {message}")]
    ServerError { code: i32, message: String },

    /// A response reply whose `result` does not have the expected shape.
    #[error("unexpected result for '{method}': {reason}")]
    UnexpectedResult { method: String, reason: String },
}
