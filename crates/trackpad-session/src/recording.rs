//! In-memory remote session.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use trackpad_core::traits::{EventCallback, RemoteSession, SessionError, SessionEvent, SessionState};

/// Operation received by a `RecordingSession`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Connect,
    Disconnect,
    Move { dx: f64, dy: f64 },
    Scroll { dx: f64, dy: f64 },
    Click,
}

/// Knobs for simulating a misbehaving device.
#[derive(Debug, Clone, Default)]
pub struct RecordingBehavior {
    /// Fail `connect` with this message.
    pub fail_connect: Option<String>,
    pub connect_delay: Duration,
    /// Delay applied to move/scroll/click.
    pub op_delay: Duration,
}

type SharedCallback = Arc<Mutex<Option<EventCallback>>>;

/// Session that records operations instead of talking to a device.
///
/// Useful for development and tests. Nothing leaves the process.
pub struct RecordingSession {
    log: Arc<Mutex<Vec<RecordedOp>>>,
    callback: SharedCallback,
    behavior: RecordingBehavior,
    state: SessionState,
}

impl RecordingSession {
    /// Create a well-behaved recording session.
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(RecordingBehavior::default())
    }

    #[must_use]
    pub fn with_behavior(behavior: RecordingBehavior) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            callback: Arc::new(Mutex::new(None)),
            behavior,
            state: SessionState::Disconnected,
        }
    }

    /// Handle for inspecting the session after it has been moved elsewhere.
    #[must_use]
    pub fn handle(&self) -> RecordingHandle {
        RecordingHandle {
            log: Arc::clone(&self.log),
            callback: Arc::clone(&self.callback),
        }
    }

    fn record(&self, op: RecordedOp) {
        tracing::debug!(?op, "recording session operation");
        if let Ok(mut log) = self.log.lock() {
            log.push(op);
        }
    }

    async fn pointer_op(&self, op: RecordedOp) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        if !self.behavior.op_delay.is_zero() {
            tokio::time::sleep(self.behavior.op_delay).await;
        }
        self.record(op);
        Ok(())
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSession for RecordingSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Connecting;
        self.record(RecordedOp::Connect);
        if !self.behavior.connect_delay.is_zero() {
            tokio::time::sleep(self.behavior.connect_delay).await;
        }
        if let Some(message) = &self.behavior.fail_connect {
            self.state = SessionState::Disconnected;
            return Err(SessionError::Connect(message.clone()));
        }
        self.state = SessionState::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Closing;
        self.record(RecordedOp::Disconnect);
        self.state = SessionState::Disconnected;
        Ok(())
    }

    async fn move_pointer(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.pointer_op(RecordedOp::Move { dx, dy }).await
    }

    async fn scroll(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.pointer_op(RecordedOp::Scroll { dx, dy }).await
    }

    async fn click(&mut self) -> Result<(), SessionError> {
        self.pointer_op(RecordedOp::Click).await
    }

    fn set_event_callback(&mut self, callback: EventCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

/// Inspection and fault-injection handle for a `RecordingSession`.
#[derive(Clone)]
pub struct RecordingHandle {
    log: Arc<Mutex<Vec<RecordedOp>>>,
    callback: SharedCallback,
}

impl RecordingHandle {
    /// Snapshot of recorded operations, oldest first.
    #[must_use]
    pub fn ops(&self) -> Vec<RecordedOp> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Recorded operations other than connect/disconnect.
    #[must_use]
    pub fn pointer_ops(&self) -> Vec<RecordedOp> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, RecordedOp::Connect | RecordedOp::Disconnect))
            .collect()
    }

    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Disconnect))
            .count()
    }

    /// Push an event through the installed callback, as a device would.
    ///
    /// Returns false if no callback is installed.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let Ok(slot) = self.callback.lock() else {
            return false;
        };
        slot.as_ref().is_some_and(|callback| {
            callback(event);
            true
        })
    }
}
