//! A joined room: history, live channel and transcript behind one handle.
//!
//! [`RoomSession::join`] spawns a driver task that owns the room's
//! [`Reconciler`]. Every input (the history fetch, channel frames, channel
//! closure, reconnect timers, user commands) is handled on that one task, so
//! the transcript has a single writer. Readers observe it through
//! [`RoomSnapshot`]s published on a `watch` channel after every change.

use std::collections::BTreeSet;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, Sleep};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use roomchat_core::{ConnectionState, Ingest, Message, Reconciler, RoomCode, Session, UserId};

use crate::backend::RoomBackend;
use crate::backoff::Backoff;
use crate::channel::{ChannelHandle, ChannelSignal};
use crate::config::ClientConfig;
use crate::convert::history_to_messages;
use crate::error::ClientError;
use crate::types::{HistoryMessage, SentMessage};

/// Point-in-time view of a room.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room: RoomCode,
    /// Transcript in display order.
    pub messages: Vec<Message>,
    /// True while a bot reply is streaming.
    pub streaming: bool,
    pub connection: ConnectionState,
    /// True once history has been applied or has failed.
    pub history_loaded: bool,
    pub history_error: Option<String>,
    /// Why the channel last failed to open or closed, if it did.
    pub channel_error: Option<String>,
    /// Senders seen in the transcript plus the local user.
    pub members: BTreeSet<UserId>,
}

impl RoomSnapshot {
    fn empty(room: RoomCode, session: &Session) -> Self {
        let mut members = BTreeSet::new();
        members.insert(session.user_id.clone());
        Self {
            room,
            messages: Vec::new(),
            streaming: false,
            connection: ConnectionState::Connecting,
            history_loaded: false,
            history_error: None,
            channel_error: None,
            members,
        }
    }
}

enum RoomCommand {
    Send {
        content: String,
        reply: oneshot::Sender<Result<SentMessage, ClientError>>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Handle to a joined room.
///
/// Dropping the handle closes the room.
pub struct RoomSession {
    room: RoomCode,
    commands: mpsc::Sender<RoomCommand>,
    updates: watch::Receiver<RoomSnapshot>,
}

impl RoomSession {
    /// Join `room`: fetch its history and open its channel concurrently.
    ///
    /// Never fails. A channel that cannot be opened shows up as a `Closed`
    /// connection state in the snapshot. Must be called within a Tokio
    /// runtime.
    pub fn join<B>(backend: Arc<B>, session: Arc<Session>, room: RoomCode, config: ClientConfig) -> Self
    where
        B: RoomBackend + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (updates_tx, updates_rx) = watch::channel(RoomSnapshot::empty(room.clone(), &session));

        let driver = RoomDriver {
            backoff: Backoff::new(config.reconnect.clone()),
            reconciler: Reconciler::new(room.clone(), session),
            backend,
            updates: updates_tx,
            connection: ConnectionState::Connecting,
            channel_error: None,
        };
        tokio::spawn(driver.run(commands_rx));

        info!(room = %room, "Joined room");
        Self {
            room,
            commands: commands_tx,
            updates: updates_rx,
        }
    }

    /// Room this session is bound to.
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.updates.borrow().clone()
    }

    /// Receiver that is notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.updates.clone()
    }

    /// Stream of snapshots, starting with the current one.
    pub fn updates(&self) -> WatchStream<RoomSnapshot> {
        WatchStream::new(self.updates.clone())
    }

    /// Send `content` to the room.
    ///
    /// Resolves with the backend's acknowledgement. The transcript only
    /// changes when the backend echoes the message over the channel.
    pub async fn send(&self, content: impl Into<String>) -> Result<SentMessage, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RoomCommand::Send {
                content: content.into(),
                reply,
            })
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Close the channel and stop the driver. Calling it again does nothing.
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.commands.send(RoomCommand::Close { done }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Returns true once the driver has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

struct RoomDriver<B> {
    backend: Arc<B>,
    reconciler: Reconciler,
    backoff: Backoff,
    updates: watch::Sender<RoomSnapshot>,
    connection: ConnectionState,
    channel_error: Option<String>,
}

type HistoryTask = JoinHandle<Result<Vec<HistoryMessage>, ClientError>>;
type OpenTask = JoinHandle<Result<ChannelHandle, ClientError>>;

impl<B: RoomBackend + 'static> RoomDriver<B> {
    async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        let room = self.reconciler.room().clone();

        let mut history: Option<HistoryTask> = Some(self.spawn_history());
        let mut opening: Option<OpenTask> = Some(self.spawn_open());
        let mut channel: Option<ChannelHandle> = None;
        let mut reconnect: Option<Pin<Box<Sleep>>> = None;

        let done = loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(RoomCommand::Send { content, reply }) => self.dispatch_send(content, reply),
                    Some(RoomCommand::Close { done }) => break Some(done),
                    None => break None,
                },

                result = join_pending(&mut history) => {
                    history = None;
                    self.apply_history(result);
                }

                result = join_pending(&mut opening) => {
                    opening = None;
                    match result {
                        Ok(Ok(handle)) => {
                            info!(room = %room, "Channel open");
                            channel = Some(handle);
                            self.backoff.reset();
                            self.connection = ConnectionState::Open;
                            self.channel_error = None;
                            self.publish();
                        }
                        Ok(Err(e)) => {
                            warn!(room = %room, error = %e, "Failed to open channel");
                            let retry = !matches!(e, ClientError::Unauthorized(_));
                            reconnect = self.channel_down(e.to_string(), retry);
                        }
                        Err(e) => {
                            reconnect = self.channel_down(e.to_string(), true);
                        }
                    }
                }

                signal = next_signal(&mut channel) => match signal {
                    Some(ChannelSignal::Frame(frame)) => {
                        if self.reconciler.ingest_frame(&frame) == Ingest::Applied {
                            self.publish();
                        }
                    }
                    other => {
                        channel = None;
                        let reason = match other {
                            Some(ChannelSignal::Closed { reason: Some(reason) }) => reason,
                            _ => "connection lost".to_string(),
                        };
                        info!(room = %room, reason = %reason, "Channel closed");
                        reconnect = self.channel_down(reason, true);
                    }
                },

                _ = wait(&mut reconnect) => {
                    reconnect = None;
                    debug!(room = %room, attempt = self.backoff.attempt(), "Reconnecting");
                    self.connection = ConnectionState::Connecting;
                    self.publish();
                    opening = Some(self.spawn_open());
                }
            }
        };

        if let Some(task) = history {
            task.abort();
        }
        if let Some(task) = opening {
            task.abort();
        }
        if let Some(handle) = channel {
            handle.shutdown().await;
        }
        self.reconciler.channel_closed();
        self.connection = ConnectionState::Closed { retry_in: None };
        self.publish();
        info!(room = %room, "Room closed");

        drop(commands);
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    fn spawn_history(&self) -> HistoryTask {
        let backend = self.backend.clone();
        let room = self.reconciler.room().clone();
        tokio::spawn(async move { backend.fetch_history(&room).await })
    }

    fn spawn_open(&self) -> OpenTask {
        let backend = self.backend.clone();
        let room = self.reconciler.room().clone();
        tokio::spawn(async move { backend.open_channel(&room).await })
    }

    fn dispatch_send(&self, content: String, reply: oneshot::Sender<Result<SentMessage, ClientError>>) {
        let delivery = self.reconciler.send(self.backend.clone(), content);
        tokio::spawn(async move {
            let result = delivery.await.map_err(ClientError::from);
            let _ = reply.send(result);
        });
    }

    fn apply_history(&mut self, result: Result<Result<Vec<HistoryMessage>, ClientError>, JoinError>) {
        match result {
            Ok(Ok(entries)) => {
                let messages = history_to_messages(
                    entries,
                    self.reconciler.session(),
                    self.reconciler.bot_sender(),
                );
                self.reconciler.ingest_history(messages);
            }
            Ok(Err(e)) => self.reconciler.history_failed(e.to_string()),
            Err(e) => self.reconciler.history_failed(e.to_string()),
        }
        self.publish();
    }

    /// Freeze open streams and schedule the next attempt, if any.
    fn channel_down(&mut self, reason: String, retry: bool) -> Option<Pin<Box<Sleep>>> {
        self.reconciler.channel_closed();
        self.channel_error = Some(reason);

        let delay = if retry { self.backoff.next_delay() } else { None };
        self.connection = ConnectionState::Closed { retry_in: delay };
        self.publish();

        match delay {
            Some(d) => {
                debug!(room = %self.reconciler.room(), delay_ms = d.as_millis() as u64, "Reconnect scheduled");
                Some(Box::pin(sleep(d)))
            }
            None => {
                warn!(room = %self.reconciler.room(), "Giving up on realtime channel");
                None
            }
        }
    }

    fn publish(&self) {
        let snapshot = RoomSnapshot {
            room: self.reconciler.room().clone(),
            messages: self.reconciler.transcript().to_vec(),
            streaming: self.reconciler.is_streaming(),
            connection: self.connection,
            history_loaded: self.reconciler.history_loaded(),
            history_error: self.reconciler.history_error().map(str::to_string),
            channel_error: self.channel_error.clone(),
            members: self.reconciler.participants(),
        };
        self.updates.send_replace(snapshot);
    }
}

async fn join_pending<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => pending().await,
    }
}

async fn next_signal(channel: &mut Option<ChannelHandle>) -> Option<ChannelSignal> {
    match channel {
        Some(handle) => handle.next_signal().await,
        None => pending().await,
    }
}

async fn wait(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
