//! The backend a room session talks to.

use async_trait::async_trait;

use roomchat_core::{AuthToken, Outbox, RoomCode};

use crate::channel::{ChannelHandle, RealtimeChannel};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http::ApiClient;
use crate::types::{HistoryMessage, SentMessage};

/// Everything a [`RoomSession`](crate::RoomSession) needs from the server:
/// room history, a realtime channel, and message delivery.
#[async_trait]
pub trait RoomBackend: Outbox<Receipt = SentMessage, Error = ClientError> {
    /// Stored messages of `room`, oldest first.
    async fn fetch_history(&self, room: &RoomCode) -> Result<Vec<HistoryMessage>, ClientError>;

    /// Open a realtime channel to `room`.
    async fn open_channel(&self, room: &RoomCode) -> Result<ChannelHandle, ClientError>;
}

/// [`RoomBackend`] over the REST API and the WebSocket channel.
#[derive(Clone)]
pub struct HttpBackend {
    api: ApiClient,
    ws_url: String,
    token: AuthToken,
    event_buffer: usize,
}

impl HttpBackend {
    /// Create a backend authenticated with `token`.
    pub fn new(config: &ClientConfig, token: AuthToken) -> Self {
        Self {
            api: ApiClient::new(&config.api_url).with_token(token.clone()),
            ws_url: config.ws_url.clone(),
            token,
            event_buffer: config.event_buffer,
        }
    }

    /// The REST client in use.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

#[async_trait]
impl Outbox for HttpBackend {
    type Receipt = SentMessage;
    type Error = ClientError;

    async fn deliver(&self, room: &RoomCode, content: &str) -> Result<SentMessage, ClientError> {
        self.api.deliver(room, content).await
    }
}

#[async_trait]
impl RoomBackend for HttpBackend {
    async fn fetch_history(&self, room: &RoomCode) -> Result<Vec<HistoryMessage>, ClientError> {
        self.api.messages(room).await
    }

    async fn open_channel(&self, room: &RoomCode) -> Result<ChannelHandle, ClientError> {
        RealtimeChannel::open(&self.ws_url, room, &self.token, self.event_buffer).await
    }
}
