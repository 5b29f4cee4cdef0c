//! Core domain errors.

use thiserror::Error;

/// Core domain errors for RoomChat.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Frame is not a JSON object.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A required field is absent or has the wrong type.
    #[error("Event '{event}' is missing required field '{field}'")]
    MissingField { event: String, field: String },

    /// Discriminator names an event this client does not understand.
    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    /// Identity token could not be decoded.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    pub(crate) fn missing(event: &str, field: &str) -> Self {
        Self::MissingField {
            event: event.to_string(),
            field: field.to_string(),
        }
    }
}
