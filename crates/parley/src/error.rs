//! Client error types.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while setting up a chat session.
///
/// Runtime failures (socket errors, malformed frames, sending while
/// disconnected) are deliberately not represented here: they are recovered
/// in place and surfaced through the connection state and the transcript.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured endpoint is not a well-formed WebSocket URL.
    #[error("invalid agent endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}
