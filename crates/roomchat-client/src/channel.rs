//! Realtime channel to a room over WebSocket.
//!
//! The channel only moves frames: it forwards every text frame, in the order
//! received, to whoever holds the [`ChannelHandle`], and reports exactly one
//! [`ChannelSignal::Closed`] when the connection ends. It keeps no message
//! state of its own.

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use roomchat_core::{AuthToken, RoomCode};

use crate::error::ClientError;

/// What the reader task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// One raw text frame.
    Frame(String),
    /// The connection ended. Always the last signal.
    Closed { reason: Option<String> },
}

/// Opens realtime channels.
pub struct RealtimeChannel;

impl RealtimeChannel {
    /// Connect to `{ws_url}/ws/room/{room}?token={token}`.
    ///
    /// A blank token fails immediately with [`ClientError::Connection`]
    /// without touching the network.
    pub async fn open(
        ws_url: &str,
        room: &RoomCode,
        token: &AuthToken,
        buffer: usize,
    ) -> Result<ChannelHandle, ClientError> {
        if token.is_blank() {
            return Err(ClientError::Connection("missing auth token".into()));
        }

        let url = channel_url(ws_url, room, token)?;
        debug!(room = %room, "Opening realtime channel");
        let (ws, _response) = connect_async(url.as_str()).await.map_err(handshake_error)?;
        info!(room = %room, "Realtime channel open");

        let (mut write, mut read) = ws.split();
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let room = room.clone();

        let task = tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break Some("closed by client".to_string());
                    }
                    msg = read.next() => match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if tx.send(ChannelSignal::Frame(text)).await.is_err() {
                                break Some("receiver dropped".to_string());
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            let _ = write.send(WsMessage::Pong(data)).await;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            break Some(match frame {
                                Some(frame) => format!("closed by server ({}) {}", frame.code, frame.reason),
                                None => "closed by server".to_string(),
                            });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(room = %room, error = %e, "Realtime channel error");
                            break Some(e.to_string());
                        }
                        None => break None,
                    }
                }
            };
            debug!(room = %room, reason = ?reason, "Realtime channel closed");
            let _ = tx.send(ChannelSignal::Closed { reason }).await;
        });

        Ok(ChannelHandle::from_parts(rx, Some(shutdown_tx), Some(task)))
    }
}

/// The backend rejects unknown rooms and non-members during the handshake.
fn handshake_error(err: WsError) -> ClientError {
    match &err {
        WsError::Http(response) if response.status().as_u16() == 401 || response.status().as_u16() == 403 => {
            ClientError::Unauthorized(format!("channel refused: HTTP {}", response.status()))
        }
        _ => ClientError::Connection(err.to_string()),
    }
}

/// Build `{ws_url}/ws/room/{room}?token={token}` with the room code and token
/// escaped.
fn channel_url(ws_url: &str, room: &RoomCode, token: &AuthToken) -> Result<Url, ClientError> {
    let mut url = Url::parse(ws_url)
        .map_err(|e| ClientError::Connection(format!("invalid channel URL {}: {}", ws_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::Connection(format!("channel URL cannot take a path: {}", ws_url)))?
        .pop_if_empty()
        .extend(["ws", "room", room.as_str()]);
    url.query_pairs_mut().append_pair("token", token.as_str());
    Ok(url)
}

/// Receiving end of an open channel.
pub struct ChannelHandle {
    rx: mpsc::Receiver<ChannelSignal>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl ChannelHandle {
    /// Build a handle over any signal source.
    pub fn from_parts(
        rx: mpsc::Receiver<ChannelSignal>,
        shutdown: Option<oneshot::Sender<()>>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            rx,
            shutdown,
            task,
            closed: false,
        }
    }

    /// Next signal, in the order the connection produced them.
    ///
    /// Returns `None` once the channel has been closed and drained.
    pub async fn next_signal(&mut self) -> Option<ChannelSignal> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(ChannelSignal::Closed { reason }) => {
                self.closed = true;
                Some(ChannelSignal::Closed { reason })
            }
            Some(signal) => Some(signal),
            None => {
                self.closed = true;
                Some(ChannelSignal::Closed {
                    reason: Some("channel dropped".into()),
                })
            }
        }
    }

    /// Close the connection. Calling it again does nothing.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.closed = true;
        self.rx.close();
    }

    /// Close the connection and wait for the reader task to finish.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Returns true once the channel has reported closure or been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_url() {
        let url = channel_url("ws://localhost:8000/", &RoomCode::new("AB12CD"), &AuthToken::new("a.b-c")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/room/AB12CD?token=a.b-c");
    }

    #[test]
    fn test_channel_url_encodes_token() {
        let url = channel_url("ws://h", &RoomCode::new("R"), &AuthToken::new("a+b/c=")).unwrap();
        assert_eq!(url.as_str(), "ws://h/ws/room/R?token=a%2Bb%2Fc%3D");
    }

    #[test]
    fn test_channel_url_escapes_room_code() {
        let url = channel_url("ws://h/", &RoomCode::new("A/B?x"), &AuthToken::new("t")).unwrap();
        assert_eq!(url.path(), "/ws/room/A%2FB%3Fx");
        assert_eq!(url.query(), Some("token=t"));
    }

    #[test]
    fn test_channel_url_rejects_garbage_base() {
        let result = channel_url("not a url", &RoomCode::new("R"), &AuthToken::new("t"));
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn test_blank_token_rejected_without_network() {
        let result = RealtimeChannel::open("ws://127.0.0.1:1", &RoomCode::new("R"), &AuthToken::new(""), 8).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn test_handle_reports_single_close() {
        let (tx, rx) = mpsc::channel(4);
        let mut handle = ChannelHandle::from_parts(rx, None, None);
        tx.send(ChannelSignal::Frame("a".into())).await.unwrap();
        tx.send(ChannelSignal::Closed { reason: None }).await.unwrap();

        assert_eq!(handle.next_signal().await, Some(ChannelSignal::Frame("a".into())));
        assert_eq!(handle.next_signal().await, Some(ChannelSignal::Closed { reason: None }));
        assert!(handle.is_closed());
        assert_eq!(handle.next_signal().await, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_tx, rx) = mpsc::channel::<ChannelSignal>(1);
        let mut handle = ChannelHandle::from_parts(rx, None, None);
        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert_eq!(handle.next_signal().await, None);
    }
}
