use thiserror::Error;

/// Error types for the porthole tunnel system
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Local server unreachable: {0}")]
    LocalUnreachable(String),

    #[error("Tunnel capacity exceeded (max {0})")]
    CapacityExceeded(usize),

    #[error("Unable to allocate a free slug")]
    SlugExhausted,

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
