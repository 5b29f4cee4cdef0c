//! Chat message types for the room transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, UserId};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    /// A person typing into a client.
    Human,
    /// The room bot answering commands.
    Automated,
}

/// Author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Backend user id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Human or bot.
    pub kind: SenderKind,
}

impl Sender {
    /// Create a human sender.
    pub fn human(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: SenderKind::Human,
        }
    }

    /// Create an automated sender.
    pub fn automated(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: SenderKind::Automated,
        }
    }

    /// Returns true for bot senders.
    pub fn is_automated(&self) -> bool {
        self.kind == SenderKind::Automated
    }
}

/// Message kind as stored by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text from a participant.
    #[default]
    Text,
    /// A participant message addressed to the bot.
    Command,
    /// A bot reply.
    Bot,
}

impl MessageKind {
    /// Parse a wire string. Unknown kinds read as `Text`.
    pub fn from_wire(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "command" => Self::Command,
            "bot" | "ai" => Self::Bot,
            _ => Self::Text,
        }
    }
}

/// Lifecycle of a transcript entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Content is still arriving.
    Streaming,
    /// Content is complete and immutable.
    #[default]
    Finalized,
    /// The stream was cut off before it finished. Content is frozen as-is.
    Interrupted,
}

impl MessageStatus {
    /// Returns true if the content can no longer change.
    pub fn is_frozen(&self) -> bool {
        !matches!(self, Self::Streaming)
    }
}

/// A message in the room transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Durable or provisional identity.
    pub id: MessageId,
    /// Message content.
    pub content: String,
    /// Author.
    pub sender: Sender,
    /// When the message was sent (or, for streams, when the stream began).
    pub timestamp: DateTime<Utc>,
    /// The message is a command addressed to the bot.
    pub is_command: bool,
    /// Streaming state.
    pub status: MessageStatus,
}

impl Message {
    /// Create a finalized message.
    pub fn new(
        id: MessageId,
        sender: Sender,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            content: content.into(),
            sender,
            timestamp,
            is_command: false,
            status: MessageStatus::Finalized,
        }
    }

    /// Create an empty message that is still streaming.
    pub fn streaming(id: MessageId, sender: Sender) -> Self {
        Self {
            id,
            content: String::new(),
            sender,
            timestamp: Utc::now(),
            is_command: false,
            status: MessageStatus::Streaming,
        }
    }

    /// Builder method to flag the message as a command.
    pub fn with_command(mut self, is_command: bool) -> Self {
        self.is_command = is_command;
        self
    }

    /// Returns true while content may still be appended.
    pub fn is_open(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_from_wire() {
        assert_eq!(MessageKind::from_wire("command"), MessageKind::Command);
        assert_eq!(MessageKind::from_wire("BOT"), MessageKind::Bot);
        assert_eq!(MessageKind::from_wire("text"), MessageKind::Text);
        assert_eq!(MessageKind::from_wire("system"), MessageKind::Text);
    }

    #[test]
    fn test_streaming_message_is_open() {
        let msg = Message::streaming(
            MessageId::Provisional("stream-1".into()),
            Sender::automated("bot", "AI Assistant"),
        );
        assert!(msg.is_open());
        assert!(msg.content.is_empty());
        assert!(!msg.status.is_frozen());
    }

    #[test]
    fn test_interrupted_is_frozen() {
        assert!(MessageStatus::Interrupted.is_frozen());
        assert!(MessageStatus::Finalized.is_frozen());
    }
}
