use thiserror::Error;

/// Main error type for chatlink
#[derive(Error, Debug)]
pub enum ChatLinkError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Malformed Engine.IO / Socket.IO frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Inbound payload did not have the expected shape
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// An inbound event handler failed
    #[error("Handler for '{event}' failed: {reason}")]
    Handler { event: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for chatlink operations
pub type Result<T> = std::result::Result<T, ChatLinkError>;
