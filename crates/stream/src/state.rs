//! Connection state reported by the broker client.
//!
//! The client's event callback translates `async_nats::Event`s into these
//! states and publishes them on a `watch` channel, so any task can observe
//! the connection without touching the client.

use std::fmt;

/// Lifecycle of the broker connection.
///
/// ```text
/// Connecting ──> Connected ──(lost)──> Disconnected(reason)
///                    ▲                      │
///                    └──(reconnected)───────┘
///
/// any state ──(client closed / drained)──> Closed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial handshake in progress.
    Connecting,
    /// Connected; fetches and publishes can proceed.
    Connected,
    /// Connection lost; the client reconnects in the background.
    Disconnected(String),
    /// The client is shut down and will not reconnect.
    Closed,
}

impl ConnectionState {
    /// Short identifier for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Closed => "Closed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True once the client can no longer recover by itself.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected(reason) if !reason.is_empty() => {
                write!(f, "Disconnected ({reason})")
            }
            other => write!(f, "{}", other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_as_str() {
        assert_eq!(ConnectionState::Connecting.as_str(), "Connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "Connected");
        assert_eq!(
            ConnectionState::Disconnected("eof".into()).as_str(),
            "Disconnected"
        );
        assert_eq!(ConnectionState::Closed.as_str(), "Closed");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(
            ConnectionState::Disconnected("server gone".into()).to_string(),
            "Disconnected (server gone)"
        );
        assert_eq!(
            ConnectionState::Disconnected(String::new()).to_string(),
            "Disconnected"
        );
    }

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected("x".into()).is_terminal());
    }
}
