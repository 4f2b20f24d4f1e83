//! Frame-level protocol shared by the server and client sides.
//!
//! Client to server: JSON command frames (see `CommandMessage`).
//! Server to client: plain status text.

use thiserror::Error;

/// Transport failure on one connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

#[cfg(feature = "websocket")]
impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text payload, possibly a command.
    Text(String),
    /// Peer asked to close.
    Close,
    /// Control or undecodable frame; nothing to do.
    Skip,
}

impl Inbound {
    /// Binary frames are accepted when they hold UTF-8 text.
    #[must_use]
    pub fn binary(data: &[u8]) -> Self {
        match std::str::from_utf8(data) {
            Ok(text) => Self::Text(text.to_string()),
            Err(e) => {
                tracing::debug!("Dropping non-UTF-8 binary frame: {e}");
                Self::Skip
            }
        }
    }
}

/// Result type for inbound frame streams.
pub type InboundResult = Result<Inbound, TransportError>;
