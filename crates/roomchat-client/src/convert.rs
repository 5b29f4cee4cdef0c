//! Conversions from API bodies into domain types.

use chrono::Utc;

use roomchat_core::event::parse_timestamp;
use roomchat_core::{Message, MessageId, MessageKind, Sender, Session, UserId};

use crate::types::HistoryMessage;

/// Turn a stored message into a finalized transcript entry.
///
/// The sender is resolved from the viewer's perspective: the local user gets
/// the session username, `bot` messages get `bot`'s name, everyone else is
/// shown as `user-{id}`.
pub fn history_to_message(entry: HistoryMessage, session: &Session, bot: &Sender) -> Message {
    let kind = entry
        .message_type
        .as_deref()
        .map(MessageKind::from_wire)
        .unwrap_or_default();
    let user_id = UserId::from(entry.user_id);

    let sender = if user_id == session.user_id {
        Sender::human(user_id, session.username.clone())
    } else if kind == MessageKind::Bot {
        Sender::automated(user_id, bot.name.clone())
    } else {
        let name = format!("user-{}", user_id);
        Sender::human(user_id, name)
    };

    let timestamp = entry
        .sent_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    Message::new(
        MessageId::durable(entry.message_id.to_string()),
        sender,
        entry.content,
        timestamp,
    )
    .with_command(kind == MessageKind::Command)
}

/// Convert a whole history page, preserving order.
pub fn history_to_messages(
    entries: Vec<HistoryMessage>,
    session: &Session,
    bot: &Sender,
) -> Vec<Message> {
    entries
        .into_iter()
        .map(|entry| history_to_message(entry, session, bot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use roomchat_core::{AuthToken, MessageStatus};

    fn session() -> Session {
        Session::new("7", "sophia", AuthToken::new("t"))
    }

    fn bot() -> Sender {
        Sender::automated("bot", "AI Assistant")
    }

    fn entry(id: i64, user_id: i64, kind: &str) -> HistoryMessage {
        HistoryMessage {
            message_id: id,
            room_code: Some("AB12CD".into()),
            user_id,
            content: format!("message {}", id),
            message_type: Some(kind.into()),
            sent_at: Some("2024-05-01T12:30:00.123456".into()),
        }
    }

    #[test]
    fn test_own_message_uses_session_name() {
        let msg = history_to_message(entry(1, 7, "text"), &session(), &bot());
        assert_eq!(msg.id, MessageId::durable("1"));
        assert_eq!(msg.sender.name, "sophia");
        assert_eq!(msg.status, MessageStatus::Finalized);
        assert_eq!(msg.timestamp.minute(), 30);
        assert_eq!(
            msg.timestamp.date_naive(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap().date_naive()
        );
    }

    #[test]
    fn test_bot_and_command_entries() {
        let msgs = history_to_messages(
            vec![entry(1, 8, "command"), entry(2, 3, "bot")],
            &session(),
            &bot(),
        );
        assert!(msgs[0].is_command);
        assert_eq!(msgs[0].sender.name, "user-8");
        assert!(msgs[1].sender.is_automated());
        assert_eq!(msgs[1].sender.name, "AI Assistant");
    }

    #[test]
    fn test_unparseable_timestamp_falls_back_to_now() {
        let mut raw = entry(1, 8, "text");
        raw.sent_at = Some("yesterday".into());
        let before = Utc::now();
        let msg = history_to_message(raw, &session(), &bot());
        assert!(msg.timestamp >= before);
    }
}
