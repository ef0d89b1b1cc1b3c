//! Session error types.

/// Protocol session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Inbound data is not a JSON-RPC message
    #[error("Invalid JSON-RPC message: {0}")]
    InvalidMessage(String),

    /// Payload envelope carries no method
    #[error("Envelope has no JSON-RPC method")]
    MissingMethod,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport disconnected")]
    Disconnected,
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
