//! Client configuration.

use std::time::Duration;

/// Reconnection policy for a room's realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Re-open the channel after an unexpected closure.
    pub enabled: bool,

    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,

    /// Upper bound for the delay between attempts.
    pub max_delay: Duration,

    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Room client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base URL.
    pub api_url: String,

    /// WebSocket base URL.
    pub ws_url: String,

    /// Reconnection policy for the realtime channel.
    pub reconnect: ReconnectPolicy,

    /// Capacity of the channel between the socket reader and the room driver.
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Build a config for `api_url`, deriving the WebSocket URL from it.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            ws_url: derive_ws_url(&api_url),
            api_url,
            ..Self::default()
        }
    }

    /// Builder method to override the WebSocket URL.
    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builder method to set the reconnection policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000".to_string(),
            reconnect: ReconnectPolicy::default(),
            event_buffer: 256,
        }
    }
}

/// `http://` -> `ws://`, `https://` -> `wss://`.
fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_derived_from_api_url() {
        assert_eq!(ClientConfig::new("http://chat.local:8000/").ws_url, "ws://chat.local:8000");
        assert_eq!(ClientConfig::new("https://chat.example").ws_url, "wss://chat.example");
    }

    #[test]
    fn test_ws_url_override() {
        let config = ClientConfig::new("http://api:8000").with_ws_url("ws://sockets:9000/");
        assert_eq!(config.api_url, "http://api:8000");
        assert_eq!(config.ws_url, "ws://sockets:9000");
    }

    #[test]
    fn test_disabled_policy() {
        assert!(!ReconnectPolicy::disabled().enabled);
        assert!(ReconnectPolicy::default().enabled);
    }
}
