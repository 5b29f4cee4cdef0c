//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a user account, as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<i64> for UserId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// Short public code that addresses a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomCode(String);

impl RoomCode {
    /// Create a new RoomCode from a string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RoomCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier the backend attaches to every chunk of one streamed bot reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new StreamId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<i64> for StreamId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// Identity of a transcript entry.
///
/// Durable ids come from the backend's message store. Provisional ids are
/// minted locally for streamed replies and for broadcasts that arrive
/// without a store id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageId {
    Durable(String),
    Provisional(String),
}

impl MessageId {
    /// Durable id from the history store.
    pub fn durable(id: impl Into<String>) -> Self {
        Self::Durable(id.into())
    }

    /// Provisional id for a streamed message.
    ///
    /// The first message for a stream is `stream-{id}`; a stream id that is
    /// reused after finalization gets `stream{generation}-{id}`. The generation
    /// sits before the first `-`, so ids never collide whatever the stream id
    /// contains.
    pub fn stream(stream_id: &StreamId, generation: u32) -> Self {
        if generation == 0 {
            Self::Provisional(format!("stream-{}", stream_id))
        } else {
            Self::Provisional(format!("stream{}-{}", generation, stream_id))
        }
    }

    /// Fresh provisional id for a broadcast without a durable id.
    pub fn local() -> Self {
        Self::Provisional(format!("local-{}", Uuid::new_v4()))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Durable(id) | Self::Provisional(id) => id,
        }
    }

    /// Returns true if the id was assigned by the backend store.
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_integer() {
        assert_eq!(UserId::from(42_i64), UserId::new("42"));
    }

    #[test]
    fn test_id_display() {
        let code = RoomCode::new("AB12CD");
        assert_eq!(format!("{}", code), "AB12CD");
    }

    #[test]
    fn test_stream_message_ids() {
        let sid = StreamId::from(42_i64);
        assert_eq!(MessageId::stream(&sid, 0).as_str(), "stream-42");
        assert_eq!(MessageId::stream(&sid, 2).as_str(), "stream2-42");
        assert!(!MessageId::stream(&sid, 0).is_durable());
    }

    #[test]
    fn test_stream_ids_do_not_collide_across_generations() {
        let reused = MessageId::stream(&StreamId::new("5"), 1);
        let dashed = MessageId::stream(&StreamId::new("5-1"), 0);
        assert_ne!(reused, dashed);
        assert_eq!(dashed.as_str(), "stream-5-1");
    }

    #[test]
    fn test_local_ids_are_unique() {
        let a = MessageId::local();
        let b = MessageId::local();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("local-"));
    }
}
