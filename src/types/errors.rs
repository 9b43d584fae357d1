//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for node-probe.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing tool arguments.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// No tool registered under this name (or removed by the allow-list).
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The peer executed the call and reported a failure.
    #[error("remote tool error on {node}: {message}")]
    RemoteTool { node: String, message: String },

    /// The round trip to a peer failed (unreachable, timed out, dropped).
    #[error("remote call to {node} failed: {cause}")]
    Transport { node: String, cause: String },

    /// Request validation errors outside tool arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wire-level error code used in IPC error frames.
    pub fn to_ipc_error_code(&self) -> &'static str {
        match self {
            Error::InvalidParams(_) | Error::Validation(_) => "INVALID_ARGUMENT",
            Error::UnknownTool(_) | Error::NotFound(_) => "NOT_FOUND",
            Error::RemoteTool { .. } => "REMOTE_ERROR",
            Error::Transport { .. } => "UNAVAILABLE",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "INTERNAL",
        }
    }

    /// True when the failure happened on the way to or from a peer rather
    /// than inside a tool.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

// Convenience constructors
impl Error {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool(name.into())
    }

    pub fn remote_tool(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteTool {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn transport(node: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Transport {
            node: node.into(),
            cause: cause.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
