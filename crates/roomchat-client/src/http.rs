//! HTTP client for REST endpoints.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use roomchat_core::{AuthToken, Outbox, RoomCode};

use crate::error::ClientError;
use crate::types::{
    AuthRequest, AuthResponse, CreateRoomRequest, CreateRoomResponse, HistoryMessage,
    JoinRoomResponse, MessagesResponse, Room, SendMessageRequest, SentMessage, SignupResponse,
    User, UserProfileResponse,
};

/// HTTP client for the room REST API.
#[derive(Clone)]
pub struct ApiClient {
    inner: reqwest::Client,
    base_url: String,
    token: Option<AuthToken>,
}

impl ApiClient {
    /// Create a new unauthenticated client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Clone of this client that sends `token` as a bearer credential.
    pub fn with_token(&self, token: AuthToken) -> Self {
        Self {
            inner: self.inner.clone(),
            base_url: self.base_url.clone(),
            token: Some(token).filter(|t| !t.is_blank()),
        }
    }

    /// Base URL requests are rooted at.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bearer token in use, if any.
    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    /// Register a new account.
    pub async fn signup(&self, username: &str, password: &str) -> Result<SignupResponse, ClientError> {
        let body = AuthRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = self.inner.post(self.url("/auth/signup")).json(&body);
        self.execute(request, "/auth/signup").await
    }

    /// Exchange credentials for an access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = AuthRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = self.inner.post(self.url("/auth/login")).json(&body);
        self.execute(request, "/auth/login").await
    }

    /// The account the token belongs to.
    pub async fn me(&self) -> Result<User, ClientError> {
        let profile: UserProfileResponse = self.get_json("/auth/me").await?;
        Ok(profile.user)
    }

    /// Rooms the current user is a member of.
    pub async fn my_rooms(&self) -> Result<Vec<Room>, ClientError> {
        self.get_json("/rooms/my_rooms").await
    }

    /// Room details and its members.
    pub async fn room(&self, code: &RoomCode) -> Result<Room, ClientError> {
        self.get_json(&format!("/rooms/{}", code)).await
    }

    /// Create a room owned by the current user.
    pub async fn create_room(&self, name: &str) -> Result<CreateRoomResponse, ClientError> {
        let body = CreateRoomRequest {
            name: name.to_string(),
        };
        let request = self.authorize(self.inner.post(self.url("/create_room")).json(&body));
        self.execute(request, "/create_room").await
    }

    /// Join a room as a participant. Joining twice is harmless.
    pub async fn join_room(&self, code: &RoomCode) -> Result<JoinRoomResponse, ClientError> {
        let path = format!("/rooms/{}/join", code);
        let request = self.authorize(self.inner.post(self.url(&path)));
        self.execute(request, &path).await
    }

    /// Stored messages of a room, oldest first.
    pub async fn messages(&self, code: &RoomCode) -> Result<Vec<HistoryMessage>, ClientError> {
        let response: MessagesResponse = self.get_json(&format!("/room/{}/messages", code)).await?;
        Ok(response.messages)
    }

    /// Post a message to a room.
    pub async fn send_message(&self, code: &RoomCode, content: &str) -> Result<SentMessage, ClientError> {
        let path = format!("/room/{}/send_message", code);
        let body = SendMessageRequest {
            content: content.to_string(),
        };
        let request = self.authorize(self.inner.post(self.url(&path)).json(&body));
        self.execute(request, &path).await
    }

    /// Get JSON from an endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let request = self.authorize(self.inner.get(self.url(path)));
        self.execute(request, path).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<T, ClientError> {
        debug!(url = %self.url(path), "API request");
        let response = request.send().await?;
        let response = check_status(response, path).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }
}

/// Map non-success responses onto [`ClientError`].
async fn check_status(response: Response, path: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_detail(&body).unwrap_or_else(|| format!("HTTP {}: {}", status, path));
    debug!(status = %status, path = %path, message = %message, "API request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        _ => ClientError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

/// The `detail` field of an error body, when it is a plain string.
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("detail")
        .and_then(|d| d.as_str())
        .map(str::to_string)
}

#[async_trait]
impl Outbox for ApiClient {
    type Receipt = SentMessage;
    type Error = ClientError;

    async fn deliver(&self, room: &RoomCode, content: &str) -> Result<SentMessage, ClientError> {
        self.send_message(room, content).await
    }
}
