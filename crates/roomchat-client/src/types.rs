//! Request and response bodies of the REST API.

use serde::{Deserialize, Serialize};

/// Credentials for signup and login.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// Token issued by login.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Body of `POST /auth/signup`. Some deployments issue a token right away.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// A user account.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Body of `GET /auth/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfileResponse {
    pub user: User,
}

/// Membership of one user in a room.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomUser {
    pub user_id: i64,
    #[serde(default)]
    pub role: Option<String>,
}

/// A chat room.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Room {
    pub room_id: i64,
    pub room_name: String,
    pub room_code: String,
    #[serde(default)]
    pub users: Vec<RoomUser>,
}

/// Body of `POST /create_room`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRoomRequest {
    pub name: String,
}

/// A freshly created room.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: i64,
    pub room_name: String,
    pub room_code: String,
}

/// Body returned by `POST /rooms/{code}/join`.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRoomResponse {
    pub room_name: String,
    pub room_code: String,
    #[serde(default)]
    pub joined_at: Option<String>,
}

/// One stored message, as returned by the history endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryMessage {
    pub message_id: i64,
    #[serde(default)]
    pub room_code: Option<String>,
    pub user_id: i64,
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub sent_at: Option<String>,
}

/// Body of `GET /room/{code}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

/// Body of `POST /room/{code}/send_message`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// The stored message returned after a successful send.
pub type SentMessage = HistoryMessage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_response_decodes() {
        let body = r#"{"messages":[{"message_id":3,"room_code":"AB12CD","user_id":7,
            "content":"hi","message_type":"text","sent_at":"2024-05-01T12:00:00"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].message_id, 3);
        assert_eq!(parsed.messages[0].message_type.as_deref(), Some("text"));
    }

    #[test]
    fn test_signup_without_token_decodes() {
        let parsed: SignupResponse =
            serde_json::from_str(r#"{"detail":"User created successfully"}"#).unwrap();
        assert!(parsed.access_token.is_none());
    }

    #[test]
    fn test_room_without_users_decodes() {
        let body = r#"{"room_id":1,"room_name":"General","room_code":"AB12CD"}"#;
        let room: Room = serde_json::from_str(body).unwrap();
        assert!(room.users.is_empty());
    }
}
