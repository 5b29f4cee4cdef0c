//! Seam for delivering outgoing messages to the backend.

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::RoomCode;

/// Delivers a composed message to the backend.
///
/// Delivery never touches the transcript: the backend fans the message back
/// out over the room channel, and that echo is what gets displayed.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Acknowledgement returned by the backend.
    type Receipt: Send + 'static;
    /// Transport failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send `content` to `room`.
    async fn deliver(&self, room: &RoomCode, content: &str)
        -> Result<Self::Receipt, Self::Error>;
}

/// Why a send did not go through.
#[derive(Debug, Error)]
pub enum SendError<E: std::error::Error + 'static> {
    /// Nothing to send.
    #[error("message is empty")]
    Empty,

    /// The backend refused or could not be reached.
    #[error("send failed: {0}")]
    Rejected(#[source] E),
}
