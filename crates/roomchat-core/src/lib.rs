//! RoomChat Core Domain Types
//!
//! This crate contains the client-side chat domain with no dependencies on:
//! - HTTP or WebSocket transports
//! - Any rendering framework
//! - Runtime specifics
//!
//! The centrepiece is [`Reconciler`], which merges room history, streamed
//! bot output and broadcast messages into one ordered transcript.

pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod outbox;
pub mod reconciler;
pub mod session;
pub mod status;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{ChannelEvent, FullMessage};
pub use ids::{MessageId, RoomCode, StreamId, UserId};
pub use message::{Message, MessageKind, MessageStatus, Sender, SenderKind};
pub use outbox::{Outbox, SendError};
pub use reconciler::{Ingest, Reconciler, DEFAULT_BOT_NAME};
pub use session::{AuthToken, Session};
pub use status::ConnectionState;
