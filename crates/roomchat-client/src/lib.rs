//! Client library for RoomChat rooms.
//!
//! Provides the REST client, the realtime WebSocket channel, and
//! [`RoomSession`], which keeps a room's transcript in sync with both.

pub mod backend;
pub mod backoff;
pub mod channel;
pub mod config;
pub mod convert;
pub mod error;
pub mod http;
pub mod room;
pub mod types;

pub use backend::{HttpBackend, RoomBackend};
pub use backoff::Backoff;
pub use channel::{ChannelHandle, ChannelSignal, RealtimeChannel};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::ClientError;
pub use http::ApiClient;
pub use room::{RoomSession, RoomSnapshot};
pub use types::{HistoryMessage, Room, SentMessage, User};
