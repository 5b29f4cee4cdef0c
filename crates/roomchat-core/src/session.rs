//! Authenticated identity for the lifetime of the client process.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CoreError;
use crate::ids::UserId;

/// Opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank token counts as no token at all.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: serde_json::Value,
    #[serde(default)]
    exp: Option<i64>,
}

/// The signed-in user.
///
/// Built once at start-up and shared by reference with every component that
/// needs the identity or the token.
#[derive(Debug, Clone)]
pub struct Session {
    /// Backend user id.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    token: AuthToken,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session from known parts.
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>, token: AuthToken) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            token,
            expires_at: None,
        }
    }

    /// Create a session by reading the user id (`sub`) and expiry (`exp`)
    /// out of a JWT payload. The signature is not verified.
    pub fn from_token(token: AuthToken, username: impl Into<String>) -> Result<Self, CoreError> {
        let payload = token
            .as_str()
            .split('.')
            .nth(1)
            .ok_or_else(|| CoreError::InvalidToken("not a JWT".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| CoreError::InvalidToken(e.to_string()))?;
        let claims: Claims =
            serde_json::from_slice(&bytes).map_err(|e| CoreError::InvalidToken(e.to_string()))?;

        let user_id = match claims.sub {
            serde_json::Value::String(s) => UserId::new(s),
            serde_json::Value::Number(n) => UserId::new(n.to_string()),
            _ => return Err(CoreError::InvalidToken("'sub' is not an id".into())),
        };

        Ok(Self {
            user_id,
            username: username.into(),
            token,
            expires_at: claims
                .exp
                .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0)),
        })
    }

    /// The bearer token.
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Expiry read from the token, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the token carries an expiry that has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> AuthToken {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload);
        AuthToken::new(format!("{}.{}.signature", header, body))
    }

    #[test]
    fn test_from_token_reads_subject() {
        let session = Session::from_token(jwt(r#"{"sub":"17","exp":4102444800}"#), "sophia").unwrap();
        assert_eq!(session.user_id, UserId::new("17"));
        assert_eq!(session.username, "sophia");
        assert!(!session.is_expired(Utc::now()));
    }

    #[test]
    fn test_from_token_numeric_subject_and_expiry() {
        let session = Session::from_token(jwt(r#"{"sub":17,"exp":1000}"#), "alex").unwrap();
        assert_eq!(session.user_id, UserId::from(17_i64));
        assert!(session.is_expired(Utc::now()));
    }

    #[test]
    fn test_from_token_rejects_garbage() {
        assert!(Session::from_token(AuthToken::new("opaque"), "x").is_err());
        assert!(Session::from_token(AuthToken::new("a.!!!.c"), "x").is_err());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AuthToken::new("secret-value");
        assert!(!format!("{:?}", token).contains("secret"));
        assert!(AuthToken::new("   ").is_blank());
    }
}
