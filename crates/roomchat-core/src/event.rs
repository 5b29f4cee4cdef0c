//! Events pushed by the server over a room's realtime channel.
//!
//! Frames are JSON objects. Streamed bot replies carry a `type`
//! discriminator (`bot_message_start`, `bot_message_delta`,
//! `bot_message_end`). Plain broadcasts and the connect greeting carry no
//! discriminator and are recognised by their fields.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::ids::{StreamId, UserId};
use crate::message::MessageKind;

/// A complete, non-streamed message broadcast to the room.
#[derive(Debug, Clone, PartialEq)]
pub struct FullMessage {
    /// Store id, when the backend includes one.
    pub message_id: Option<String>,
    /// Author.
    pub sender_id: UserId,
    /// Author display name, when the backend includes one.
    pub sender_name: Option<String>,
    /// Message body.
    pub content: String,
    /// Stored message kind.
    pub kind: MessageKind,
    /// Send time reported by the backend.
    pub timestamp: Option<DateTime<Utc>>,
}

impl FullMessage {
    /// Create a full message with only the required fields.
    pub fn new(sender_id: impl Into<UserId>, content: impl Into<String>) -> Self {
        Self {
            message_id: None,
            sender_id: sender_id.into(),
            sender_name: None,
            content: content.into(),
            kind: MessageKind::Text,
            timestamp: None,
        }
    }

    /// Builder method to attach a durable id.
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Builder method to set the message kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A discrete unit pushed over the realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection greeting. Informational only.
    Welcome { text: Option<String> },
    /// A streamed bot reply begins.
    ChunkStart {
        stream_id: StreamId,
        sender_id: Option<UserId>,
        sender_name: Option<String>,
    },
    /// More content for an open stream.
    ChunkDelta { stream_id: StreamId, content: String },
    /// The stream is complete.
    ChunkEnd { stream_id: StreamId },
    /// A complete message from a participant or a non-streamed bot reply.
    FullMessage(FullMessage),
}

impl ChannelEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::ChunkStart { .. } => "chunk_start",
            Self::ChunkDelta { .. } => "chunk_delta",
            Self::ChunkEnd { .. } => "chunk_end",
            Self::FullMessage(_) => "full_message",
        }
    }

    /// Convenience constructor for a stream start without sender details.
    pub fn chunk_start(stream_id: impl Into<StreamId>) -> Self {
        Self::ChunkStart {
            stream_id: stream_id.into(),
            sender_id: None,
            sender_name: None,
        }
    }

    /// Convenience constructor for a stream delta.
    pub fn chunk_delta(stream_id: impl Into<StreamId>, content: impl Into<String>) -> Self {
        Self::ChunkDelta {
            stream_id: stream_id.into(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a stream end.
    pub fn chunk_end(stream_id: impl Into<StreamId>) -> Self {
        Self::ChunkEnd {
            stream_id: stream_id.into(),
        }
    }

    /// Decode one text frame.
    pub fn parse(frame: &str) -> Result<Self, CoreError> {
        let value: Value =
            serde_json::from_str(frame).map_err(|e| CoreError::MalformedFrame(e.to_string()))?;
        let Value::Object(obj) = value else {
            return Err(CoreError::MalformedFrame("frame is not a JSON object".into()));
        };
        Self::from_object(&obj)
    }

    fn from_object(obj: &Map<String, Value>) -> Result<Self, CoreError> {
        let Some(kind) = obj.get("type") else {
            return Self::untagged(obj);
        };
        let kind = kind
            .as_str()
            .ok_or_else(|| CoreError::MalformedFrame("'type' is not a string".into()))?;

        match kind {
            "welcome" => Ok(Self::Welcome {
                text: string_field(obj, "msg").or_else(|| string_field(obj, "message")),
            }),
            "bot_message_start" => Ok(Self::ChunkStart {
                stream_id: required_id(obj, kind, "message_id")?.into(),
                sender_id: id_field(obj, "sender_id").map(UserId::from),
                sender_name: string_field(obj, "sender_name"),
            }),
            "bot_message_delta" => Ok(Self::ChunkDelta {
                stream_id: required_id(obj, kind, "message_id")?.into(),
                content: string_field(obj, "content")
                    .ok_or_else(|| CoreError::missing(kind, "content"))?,
            }),
            "bot_message_end" => Ok(Self::ChunkEnd {
                stream_id: required_id(obj, kind, "message_id")?.into(),
            }),
            "message" | "chat" => full_message(obj, kind).map(Self::FullMessage),
            other => Err(CoreError::UnknownEvent(other.to_string())),
        }
    }

    fn untagged(obj: &Map<String, Value>) -> Result<Self, CoreError> {
        if obj.contains_key("message") || obj.contains_key("sender_id") {
            return full_message(obj, "message").map(Self::FullMessage);
        }
        if obj.contains_key("msg") {
            return Ok(Self::Welcome {
                text: string_field(obj, "msg"),
            });
        }
        Err(CoreError::MalformedFrame(
            "frame has neither 'type' nor 'message'".into(),
        ))
    }
}

fn full_message(obj: &Map<String, Value>, event: &str) -> Result<FullMessage, CoreError> {
    let sender_id = required_id(obj, event, "sender_id")?;
    let content =
        string_field(obj, "message").ok_or_else(|| CoreError::missing(event, "message"))?;

    Ok(FullMessage {
        message_id: id_field(obj, "message_id"),
        sender_id: UserId::new(sender_id),
        sender_name: string_field(obj, "sender_name"),
        content,
        kind: string_field(obj, "message_type")
            .map(|s| MessageKind::from_wire(&s))
            .unwrap_or_default(),
        timestamp: string_field(obj, "timestamp").and_then(|s| parse_timestamp(&s)),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Ids arrive as integers from the store but may also be strings.
fn id_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_id(obj: &Map<String, Value>, event: &str, key: &str) -> Result<String, CoreError> {
    id_field(obj, key).ok_or_else(|| CoreError::missing(event, key))
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 and the zone-less ISO form the backend writes for UTC
/// times (`2024-05-01T12:30:00.123456`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_greeting_without_type() {
        let event = ChannelEvent::parse(r#"{"msg": "Connected to room AB12CD"}"#).unwrap();
        assert_eq!(
            event,
            ChannelEvent::Welcome {
                text: Some("Connected to room AB12CD".into())
            }
        );
    }

    #[test]
    fn test_parse_stream_frames() {
        let start = ChannelEvent::parse(r#"{"type":"bot_message_start","message_id":42}"#).unwrap();
        assert_eq!(start, ChannelEvent::chunk_start("42"));

        let delta =
            ChannelEvent::parse(r#"{"type":"bot_message_delta","message_id":42,"content":"Hel"}"#)
                .unwrap();
        assert_eq!(delta, ChannelEvent::chunk_delta("42", "Hel"));

        let end = ChannelEvent::parse(r#"{"type":"bot_message_end","message_id":"42"}"#).unwrap();
        assert_eq!(end, ChannelEvent::chunk_end("42"));
    }

    #[test]
    fn test_parse_broadcast() {
        let frame = r#"{
            "room": "AB12CD",
            "message": "@bot summarize",
            "sender_id": 7,
            "message_type": "command",
            "timestamp": "2024-05-01T12:30:00.123456"
        }"#;
        let ChannelEvent::FullMessage(msg) = ChannelEvent::parse(frame).unwrap() else {
            panic!("expected full message");
        };
        assert_eq!(msg.sender_id, UserId::from(7_i64));
        assert_eq!(msg.content, "@bot summarize");
        assert_eq!(msg.kind, MessageKind::Command);
        assert_eq!(msg.timestamp.unwrap().minute(), 30);
        assert!(msg.message_id.is_none());
    }

    #[test]
    fn test_broadcast_without_sender_is_rejected() {
        let err = ChannelEvent::parse(r#"{"room":"AB12CD","message":"hi"}"#).unwrap_err();
        assert!(matches!(err, CoreError::MissingField { ref field, .. } if field == "sender_id"));
    }

    #[test]
    fn test_delta_without_content_is_rejected() {
        let err =
            ChannelEvent::parse(r#"{"type":"bot_message_delta","message_id":1}"#).unwrap_err();
        assert!(matches!(err, CoreError::MissingField { .. }));
    }

    #[test]
    fn test_non_object_and_unknown_frames() {
        assert!(matches!(
            ChannelEvent::parse("[1,2,3]"),
            Err(CoreError::MalformedFrame(_))
        ));
        assert!(matches!(
            ChannelEvent::parse("not json"),
            Err(CoreError::MalformedFrame(_))
        ));
        assert!(matches!(
            ChannelEvent::parse(r#"{"type":"typing"}"#),
            Err(CoreError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert!(parse_timestamp("2024-05-01T12:30:00Z").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00+02:00").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
