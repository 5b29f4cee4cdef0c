//! Incremental terminal rendering of a room transcript.

use std::collections::HashSet;

use chrono::Local;

use roomchat_client::RoomSnapshot;
use roomchat_core::{ConnectionState, Message, MessageId, MessageStatus};

/// One line of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Transcript entry, printed to stdout.
    Message(String),
    /// Connection or typing notice, printed to stderr.
    Status(String),
}

/// Tracks what has already been printed so each snapshot only adds new lines.
///
/// Settled entries are printed as soon as they appear. A streaming entry is
/// printed once it is finalized or interrupted and never holds back the
/// entries behind it.
#[derive(Debug, Default)]
pub struct TranscriptView {
    /// Every entry before this index has been printed.
    settled: usize,
    printed: HashSet<MessageId>,
    typing: bool,
    connection: Option<ConnectionState>,
    history_error_shown: bool,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `snapshot`.
    pub fn update(&mut self, snapshot: &RoomSnapshot) -> Vec<Line> {
        let mut lines = Vec::new();

        if self.connection != Some(snapshot.connection) {
            let notice = match (&snapshot.connection, &snapshot.channel_error) {
                (ConnectionState::Closed { .. }, Some(reason)) => {
                    format!("* {} ({})", snapshot.connection, reason)
                }
                _ => format!("* {}", snapshot.connection),
            };
            lines.push(Line::Status(notice));
            self.connection = Some(snapshot.connection);
        }

        if let (false, Some(reason)) = (self.history_error_shown, &snapshot.history_error) {
            lines.push(Line::Status(format!("* history unavailable: {}", reason)));
            self.history_error_shown = true;
        }

        for message in snapshot.messages.iter().skip(self.settled) {
            if message.is_open() || self.printed.contains(&message.id) {
                continue;
            }
            lines.push(Line::Message(format_message(message)));
            self.printed.insert(message.id.clone());
        }
        while let Some(message) = snapshot.messages.get(self.settled) {
            if !self.printed.remove(&message.id) {
                break;
            }
            self.settled += 1;
        }

        if snapshot.streaming != self.typing {
            self.typing = snapshot.streaming;
            if self.typing {
                let who = snapshot
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.is_open())
                    .map(|m| m.sender.name.as_str())
                    .unwrap_or("bot");
                lines.push(Line::Status(format!("* {} is typing...", who)));
            }
        }

        lines
    }
}

/// `[HH:MM:SS] name: content`, with markers for commands, bots and cut-off replies.
pub fn format_message(message: &Message) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let mut name = message.sender.name.clone();
    if message.sender.is_automated() {
        name.push_str(" (bot)");
    }
    let mut line = format!("[{}] {}: {}", time, name, message.content);
    if message.status == MessageStatus::Interrupted {
        line.push_str(" [interrupted]");
    }
    if message.is_command {
        line = format!("{} <cmd>", line);
    }
    line
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use roomchat_core::{MessageId, RoomCode, Sender};

    use super::*;

    fn snapshot(messages: Vec<Message>) -> RoomSnapshot {
        RoomSnapshot {
            room: RoomCode::new("AB12CD"),
            streaming: messages.iter().any(|m| m.is_open()),
            messages,
            connection: ConnectionState::Open,
            history_loaded: true,
            history_error: None,
            channel_error: None,
            members: BTreeSet::new(),
        }
    }

    fn said(id: &str, who: &str, text: &str) -> Message {
        Message::new(MessageId::durable(id), Sender::human("8", who), text, Utc::now())
    }

    fn streaming(text: &str) -> Message {
        let mut m = Message::streaming(MessageId::durable("s"), Sender::automated("bot", "AI Assistant"));
        m.content = text.into();
        m
    }

    fn messages(lines: &[Line]) -> Vec<&str> {
        lines
            .iter()
            .filter_map(|l| match l {
                Line::Message(text) => Some(text.as_str()),
                Line::Status(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_only_new_entries_are_printed() {
        let mut view = TranscriptView::new();
        let first = view.update(&snapshot(vec![said("1", "ana", "hi")]));
        assert_eq!(messages(&first).len(), 1);
        assert!(messages(&first)[0].ends_with("ana: hi"));

        let second = view.update(&snapshot(vec![said("1", "ana", "hi"), said("2", "bo", "yo")]));
        assert_eq!(messages(&second).len(), 1);
        assert!(messages(&second)[0].ends_with("bo: yo"));
    }

    #[test]
    fn test_messages_behind_open_stream_are_printed() {
        let mut view = TranscriptView::new();
        let lines = view.update(&snapshot(vec![streaming("Hel"), said("2", "bo", "later")]));
        let printed = messages(&lines);
        assert_eq!(printed.len(), 1);
        assert!(printed[0].ends_with("bo: later"));
        assert!(lines.contains(&Line::Status("* AI Assistant is typing...".into())));

        let lines = view.update(&snapshot(vec![
            streaming("Hello"),
            said("2", "bo", "later"),
            said("3", "ana", "still here"),
        ]));
        let printed = messages(&lines);
        assert_eq!(printed.len(), 1);
        assert!(printed[0].ends_with("ana: still here"));

        let mut done = streaming("Hello there");
        done.status = MessageStatus::Finalized;
        let lines = view.update(&snapshot(vec![
            done,
            said("2", "bo", "later"),
            said("3", "ana", "still here"),
        ]));
        let printed = messages(&lines);
        assert_eq!(printed.len(), 1);
        assert!(printed[0].ends_with("AI Assistant (bot): Hello there"));
    }

    #[test]
    fn test_interrupted_entry_is_marked() {
        let mut m = streaming("partial");
        m.status = MessageStatus::Interrupted;
        assert!(format_message(&m).ends_with("partial [interrupted]"));
    }

    #[test]
    fn test_connection_changes_are_reported_once() {
        let mut view = TranscriptView::new();
        let mut snap = snapshot(Vec::new());
        assert_eq!(view.update(&snap), vec![Line::Status("* connected".into())]);
        assert!(view.update(&snap).is_empty());

        snap.connection = ConnectionState::Closed { retry_in: None };
        snap.channel_error = Some("server restarted".into());
        assert_eq!(
            view.update(&snap),
            vec![Line::Status("* disconnected (server restarted)".into())]
        );
    }
}
