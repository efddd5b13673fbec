//! Error types for Protos providers
//!
//! This module defines all error types used throughout the crate.

use crate::event::EventKind;
use thiserror::Error;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Protos providers
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (missing identity, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The host refused the connection handshake and explained why
    #[error("Failed to establish ws connection: {0}")]
    ConnectionRejected(String),

    /// The connection could not be established at all
    #[error("Failed to establish ws connection: {0}")]
    ConnectionFailed(String),

    /// An inbound message carried a type other than `update`
    #[error("Message type {0} is not supported")]
    UnsupportedMessageType(String),

    /// An inbound message could not be decoded
    #[error("Failed to decode ws message: {0}")]
    MalformedMessage(String),

    /// Registration was attempted for a kind outside the supported set
    #[error("Event kind {0} is not supported")]
    UnsupportedKind(String),

    /// An event occurred for which no handler was registered
    #[error("No handler registered for {0} events")]
    NoHandlerRegistered(EventKind),

    /// A handler signaled failure
    #[error("Handler for {kind} events failed: {message}")]
    Handler {
        /// Kind of the event being handled
        kind: EventKind,
        /// Error reported by the handler
        message: String,
    },

    /// An inbound message could not be processed
    #[error("Failed to process event: {0}")]
    Processing(#[source] Box<Error>),

    /// Mid-session read or write failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The host answered a REST request with a non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Decoded `error` field, or the raw body
        message: String,
    },

    /// HTTP client errors (request could not be sent or read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "connection failed" error
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create a "connection rejected" error
    pub fn connection_rejected(msg: impl Into<String>) -> Self {
        Self::ConnectionRejected(msg.into())
    }

    /// Create a malformed message error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a handler failure for the given event kind
    pub fn handler(kind: EventKind, message: impl Into<String>) -> Self {
        Self::Handler {
            kind,
            message: message.into(),
        }
    }

    /// Wrap an error raised while processing an inbound message
    pub fn processing(err: Error) -> Self {
        Self::Processing(Box::new(err))
    }

    /// Whether this error came from a failed or rejected connection attempt
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionRejected(_) | Self::ConnectionFailed(_))
    }

    /// Whether this error is a protocol violation by the peer
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::UnsupportedMessageType(_) | Self::MalformedMessage(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Lets `register` accept an `EventKind` directly through `TryInto`
impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}
