//! Error types for the room client.

use thiserror::Error;

use roomchat_core::{CoreError, SendError};

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to establish the realtime channel.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Credentials missing, expired, or not allowed in this room.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The room session has been closed.
    #[error("room session closed")]
    Closed,

    /// Domain error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<SendError<ClientError>> for ClientError {
    fn from(err: SendError<ClientError>) -> Self {
        match err {
            SendError::Empty => ClientError::Core(CoreError::InvalidInput("message is empty".into())),
            SendError::Rejected(e) => e,
        }
    }
}
