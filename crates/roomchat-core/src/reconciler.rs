//! Transcript reconciliation for one room.
//!
//! The [`Reconciler`] is the only writer of a room's transcript. It merges
//! three sources into one ordered, duplicate-free list:
//!
//! 1. the history fetched when the room is opened,
//! 2. streamed bot replies (`ChunkStart` / `ChunkDelta` / `ChunkEnd`),
//! 3. complete broadcasts, including the echo of the user's own sends.
//!
//! It is a plain state machine: events are fed in one at a time, in the
//! order the channel delivered them, and the transcript is read back with
//! [`Reconciler::transcript`].

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::event::{ChannelEvent, FullMessage};
use crate::ids::{MessageId, RoomCode, StreamId, UserId};
use crate::message::{Message, MessageKind, MessageStatus, Sender};
use crate::outbox::{Outbox, SendError};
use crate::session::Session;

/// Display name used for stream frames that do not name their sender.
pub const DEFAULT_BOT_NAME: &str = "AI Assistant";

/// Outcome of feeding one event to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// The transcript changed.
    Applied,
    /// The event was valid but changed nothing.
    Ignored,
    /// History has not resolved yet; the event will be applied afterwards.
    Queued,
}

/// Single authority over a room's transcript.
pub struct Reconciler {
    room: RoomCode,
    session: Arc<Session>,
    bot: Sender,
    messages: Vec<Message>,
    /// Open stream -> index of its entry in `messages`.
    open_streams: HashMap<StreamId, usize>,
    /// How many entries each stream id has produced so far.
    generations: HashMap<StreamId, u32>,
    durable_ids: HashSet<String>,
    /// Senders known to be automated, with their display name.
    known_bots: HashMap<UserId, String>,
    /// (sender, server timestamp, content) of every entry stamped by the
    /// backend. The backend replays stored messages to each new connection
    /// without their durable ids; this is how those replays are recognised.
    stamped: HashSet<(UserId, DateTime<Utc>, String)>,
    pending: VecDeque<ChannelEvent>,
    history_loaded: bool,
    history_error: Option<String>,
}

impl Reconciler {
    /// Create an empty reconciler for `room`.
    pub fn new(room: RoomCode, session: Arc<Session>) -> Self {
        Self {
            room,
            session,
            bot: Sender::automated("bot", DEFAULT_BOT_NAME),
            messages: Vec::new(),
            open_streams: HashMap::new(),
            generations: HashMap::new(),
            durable_ids: HashSet::new(),
            known_bots: HashMap::new(),
            stamped: HashSet::new(),
            pending: VecDeque::new(),
            history_loaded: false,
            history_error: None,
        }
    }

    /// Builder method to set the sender used for unattributed stream frames.
    pub fn with_bot_sender(mut self, bot: Sender) -> Self {
        self.bot = bot;
        self
    }

    /// Room this transcript belongs to.
    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    /// Session the transcript is viewed from.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sender used for unattributed stream frames.
    pub fn bot_sender(&self) -> &Sender {
        &self.bot
    }

    /// The ordered transcript.
    pub fn transcript(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries in the transcript.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the transcript has no entries.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns true while at least one bot reply is still streaming.
    pub fn is_streaming(&self) -> bool {
        !self.open_streams.is_empty()
    }

    /// Returns true once history has been applied or has failed.
    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    /// Why the history fetch failed, if it did.
    pub fn history_error(&self) -> Option<&str> {
        self.history_error.as_deref()
    }

    /// Events waiting for history to resolve.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Everyone seen in this room: the local user plus every sender in the
    /// transcript.
    pub fn participants(&self) -> BTreeSet<UserId> {
        let mut ids: BTreeSet<UserId> = self.messages.iter().map(|m| m.sender.id.clone()).collect();
        ids.insert(self.session.user_id.clone());
        ids
    }

    /// Apply the room history.
    ///
    /// The first call replaces the (empty) transcript and then applies any
    /// events that arrived while history was loading. Later calls merge:
    /// entries whose durable id is already present are skipped and the rest
    /// are appended. Returns the number of entries added.
    pub fn ingest_history(&mut self, history: Vec<Message>) -> usize {
        let first = !self.history_loaded;
        let mut added = 0;

        for mut message in history {
            if !self.remember_durable(&message.id) {
                debug!(room = %self.room, id = %message.id, "Skipping duplicate history entry");
                continue;
            }
            if message.status == MessageStatus::Streaming {
                message.status = MessageStatus::Finalized;
            }
            self.note_sender(&message.sender);
            self.stamped.insert((
                message.sender.id.clone(),
                message.timestamp,
                message.content.clone(),
            ));
            self.messages.push(message);
            added += 1;
        }

        if first {
            self.history_loaded = true;
            self.history_error = None;
            info!(room = %self.room, messages = added, queued = self.pending.len(), "History applied");
            self.drain_pending();
        } else {
            debug!(room = %self.room, added, "History merged");
        }
        added
    }

    /// Record that the history fetch failed.
    ///
    /// The transcript starts empty and queued events are applied so the live
    /// channel still works.
    pub fn history_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.history_loaded {
            warn!(room = %self.room, reason = %reason, "History refresh failed");
            return;
        }
        warn!(room = %self.room, reason = %reason, "History unavailable, starting empty");
        self.history_loaded = true;
        self.history_error = Some(reason);
        self.drain_pending();
    }

    /// Decode and apply one raw channel frame.
    ///
    /// Frames that cannot be decoded are logged and dropped; the transcript is
    /// left untouched.
    pub fn ingest_frame(&mut self, frame: &str) -> Ingest {
        match ChannelEvent::parse(frame) {
            Ok(event) => self.ingest_event(event),
            Err(e) => {
                warn!(room = %self.room, error = %e, "Dropping malformed channel frame");
                Ingest::Ignored
            }
        }
    }

    /// Apply one channel event, or queue it if history is still loading.
    pub fn ingest_event(&mut self, event: ChannelEvent) -> Ingest {
        if let ChannelEvent::Welcome { text } = &event {
            debug!(room = %self.room, text = ?text, "Channel greeting");
            return Ingest::Ignored;
        }
        if !self.history_loaded {
            self.pending.push_back(event);
            return Ingest::Queued;
        }
        self.apply(event)
    }

    /// The channel went away. Open streams are frozen where they stand.
    ///
    /// Returns the number of streams that were cut off.
    pub fn channel_closed(&mut self) -> usize {
        let cut = self.open_streams.len();
        for (stream_id, idx) in self.open_streams.drain() {
            if let Some(message) = self.messages.get_mut(idx) {
                message.status = MessageStatus::Interrupted;
            }
            debug!(room = %self.room, stream_id = %stream_id, "Stream interrupted by disconnect");
        }
        if cut > 0 {
            info!(room = %self.room, streams = cut, "Froze open streams after disconnect");
        }
        cut
    }

    /// Hand `content` to the backend.
    ///
    /// The transcript is not touched: the message appears when the backend's
    /// echo arrives as a `FullMessage` event. The returned future owns
    /// everything it needs, so it can be spawned while events keep flowing.
    pub fn send<O>(
        &self,
        outbox: Arc<O>,
        content: String,
    ) -> impl Future<Output = Result<O::Receipt, SendError<O::Error>>> + Send + 'static
    where
        O: Outbox + 'static,
    {
        let room = self.room.clone();
        async move {
            if content.trim().is_empty() {
                return Err(SendError::Empty);
            }
            debug!(room = %room, len = content.len(), "Sending message");
            outbox
                .deliver(&room, &content)
                .await
                .map_err(SendError::Rejected)
        }
    }

    fn drain_pending(&mut self) {
        while let Some(event) = self.pending.pop_front() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: ChannelEvent) -> Ingest {
        match event {
            ChannelEvent::Welcome { .. } => Ingest::Ignored,
            ChannelEvent::ChunkStart {
                stream_id,
                sender_id,
                sender_name,
            } => {
                if self.open_streams.contains_key(&stream_id) {
                    debug!(room = %self.room, stream_id = %stream_id, "Duplicate stream start ignored");
                    return Ingest::Ignored;
                }
                let sender = match sender_id {
                    Some(id) => Sender::automated(
                        id,
                        sender_name.unwrap_or_else(|| self.bot.name.clone()),
                    ),
                    None => self.bot.clone(),
                };
                self.open_stream(stream_id, sender);
                Ingest::Applied
            }
            ChannelEvent::ChunkDelta { stream_id, content } => {
                let idx = match self.open_streams.get(&stream_id) {
                    Some(&idx) => idx,
                    None => {
                        debug!(
                            room = %self.room,
                            stream_id = %stream_id,
                            "Delta without open stream, starting a new entry"
                        );
                        self.open_stream(stream_id, self.bot.clone())
                    }
                };
                self.messages[idx].content.push_str(&content);
                Ingest::Applied
            }
            ChannelEvent::ChunkEnd { stream_id } => match self.open_streams.remove(&stream_id) {
                Some(idx) => {
                    self.messages[idx].status = MessageStatus::Finalized;
                    debug!(
                        room = %self.room,
                        stream_id = %stream_id,
                        len = self.messages[idx].content.len(),
                        "Stream finalized"
                    );
                    Ingest::Applied
                }
                None => {
                    debug!(room = %self.room, stream_id = %stream_id, "End for unknown stream ignored");
                    Ingest::Ignored
                }
            },
            ChannelEvent::FullMessage(payload) => self.append_full(payload),
        }
    }

    /// Append a new streaming entry and return its index.
    fn open_stream(&mut self, stream_id: StreamId, sender: Sender) -> usize {
        // One open stream per bot sender.
        let stale: Vec<StreamId> = self
            .open_streams
            .iter()
            .filter(|(_, idx)| self.messages[**idx].sender.id == sender.id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(idx) = self.open_streams.remove(&id) {
                self.messages[idx].status = MessageStatus::Interrupted;
                debug!(room = %self.room, stream_id = %id, "Superseded by a newer stream");
            }
        }

        let generation = self.generations.entry(stream_id.clone()).or_insert(0);
        let id = MessageId::stream(&stream_id, *generation);
        *generation += 1;

        self.note_sender(&sender);
        let idx = self.messages.len();
        self.messages.push(Message::streaming(id, sender));
        debug!(room = %self.room, stream_id = %stream_id, "Stream opened");
        self.open_streams.insert(stream_id, idx);
        idx
    }

    fn append_full(&mut self, payload: FullMessage) -> Ingest {
        let id = match payload.message_id {
            Some(id) => MessageId::durable(id),
            None => MessageId::local(),
        };
        if !self.remember_durable(&id) {
            debug!(room = %self.room, id = %id, "Duplicate broadcast ignored");
            return Ingest::Ignored;
        }
        if let Some(ts) = payload.timestamp {
            let key = (payload.sender_id.clone(), ts, payload.content.clone());
            if !self.stamped.insert(key) && !id.is_durable() {
                debug!(room = %self.room, sender = %payload.sender_id, "Replayed broadcast ignored");
                return Ingest::Ignored;
            }
        }

        let sender = self.resolve_sender(payload.sender_id, payload.sender_name, payload.kind);
        self.note_sender(&sender);
        let timestamp = payload.timestamp.unwrap_or_else(Utc::now);
        let message = Message::new(id, sender, payload.content, timestamp)
            .with_command(payload.kind == MessageKind::Command);
        self.messages.push(message);
        Ingest::Applied
    }

    fn resolve_sender(&self, id: UserId, name: Option<String>, kind: MessageKind) -> Sender {
        if id == self.session.user_id {
            return Sender::human(id, self.session.username.clone());
        }
        // Live broadcasts carry no message type; fall back to what history
        // and stream starts said about this sender.
        if let Some(known) = self.known_bots.get(&id) {
            let name = name.unwrap_or_else(|| known.clone());
            return Sender::automated(id, name);
        }
        if kind == MessageKind::Bot {
            return Sender::automated(id, name.unwrap_or_else(|| self.bot.name.clone()));
        }
        let name = name.unwrap_or_else(|| format!("user-{}", id));
        Sender::human(id, name)
    }

    fn note_sender(&mut self, sender: &Sender) {
        if sender.is_automated() && !self.known_bots.contains_key(&sender.id) {
            debug!(room = %self.room, sender = %sender.id, "Sender marked as automated");
            self.known_bots.insert(sender.id.clone(), sender.name.clone());
        }
    }

    /// Track a durable id. Returns false if it was already present.
    fn remember_durable(&mut self, id: &MessageId) -> bool {
        match id {
            MessageId::Durable(raw) => self.durable_ids.insert(raw.clone()),
            MessageId::Provisional(_) => true,
        }
    }
}
