//! Connection status text pushed to the client.

use std::fmt;

/// Status change surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusNotification {
    Connecting,
    Connected,
    ConnectFailed(String),
    Disconnected(String),
}

impl fmt::Display for StatusNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("Connecting to TV..."),
            Self::Connected => f.write_str("Connected to TV"),
            Self::ConnectFailed(error) => write!(f, "Failed to connect to TV: {error}"),
            Self::Disconnected(reason) => write!(f, "Disconnected from TV: {reason}"),
        }
    }
}
