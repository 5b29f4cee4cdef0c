//! Connection state of a room's realtime channel.

use std::fmt;
use std::time::Duration;

/// State of the live binding between a room view and its channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    #[default]
    Connecting,
    /// Channel is delivering events.
    Open,
    /// Channel is down. `retry_in` is set when a reconnect is scheduled.
    Closed { retry_in: Option<Duration> },
}

impl ConnectionState {
    /// Returns true if events are flowing.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns true if the channel is down with no reconnect scheduled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { retry_in: None })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "connected"),
            Self::Closed { retry_in: Some(d) } => {
                write!(f, "reconnecting in {:.1}s", d.as_secs_f64())
            }
            Self::Closed { retry_in: None } => write!(f, "disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "connected");
        assert_eq!(
            ConnectionState::Closed { retry_in: None }.to_string(),
            "disconnected"
        );
        assert_eq!(
            ConnectionState::Closed {
                retry_in: Some(Duration::from_millis(1500))
            }
            .to_string(),
            "reconnecting in 1.5s"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Closed { retry_in: None }.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Closed {
            retry_in: Some(Duration::from_secs(1))
        }
        .is_terminal());
    }
}
