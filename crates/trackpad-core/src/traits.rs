//! Remote device session seam.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Connectivity state of a remote session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Snapshot of the remote device as reported by its subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power_state: Option<String>,
    pub current_app_id: Option<String>,
    pub volume: Option<u32>,
    pub muted: Option<bool>,
    pub sound_output: Option<String>,
    /// Installed apps keyed by app id.
    #[serde(default)]
    pub apps: BTreeMap<String, Value>,
    /// External inputs keyed by input id.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

impl DeviceState {
    /// Copy of the state without the app and input catalogs.
    #[must_use]
    pub fn without_catalogs(&self) -> Self {
        Self {
            apps: BTreeMap::new(),
            inputs: BTreeMap::new(),
            ..self.clone()
        }
    }
}

/// Notification pushed by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The device reported new state.
    StateChanged(DeviceState),
    /// The device went away on its own.
    Disconnected { reason: String },
}

/// Callback a session invokes for every `SessionEvent`.
pub type EventCallback = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// Remote session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Session not connected")]
    NotConnected,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the session is unusable after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::NotConnected)
    }
}

/// Trait for remote pointer devices.
///
/// A session is owned by exactly one lifecycle manager and driven by exactly
/// one relay, so operations take `&mut self`.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Open the connection and complete the device handshake.
    async fn connect(&mut self) -> Result<(), SessionError>;

    /// Close the connection. Safe to call on a session that never connected.
    async fn disconnect(&mut self) -> Result<(), SessionError>;

    /// Relative pointer motion.
    async fn move_pointer(&mut self, dx: f64, dy: f64) -> Result<(), SessionError>;

    /// Scroll.
    async fn scroll(&mut self, dx: f64, dy: f64) -> Result<(), SessionError>;

    /// Click at the current pointer position.
    async fn click(&mut self) -> Result<(), SessionError>;

    /// Install the single event callback, replacing any previous one.
    fn set_event_callback(&mut self, callback: EventCallback);

    /// Current connectivity state.
    fn state(&self) -> SessionState;
}
