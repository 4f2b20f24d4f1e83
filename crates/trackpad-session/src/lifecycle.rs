//! Session lifecycle manager.
//!
//! Owns one `RemoteSession` from transport open to transport close:
//! `Idle -> Connecting -> Connected -> Closed`, with `Closed` reachable from
//! either live state. Every session operation goes through here.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use tokio::{
    sync::{Mutex, mpsc, watch},
    time::timeout,
};
use trackpad_core::traits::{DeviceState, RemoteSession, SessionError, SessionEvent};

use crate::status::StatusNotification;

/// Lifecycle state of a managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Connected,
    Closed,
}

/// Pointer operation on the remote device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerOp {
    Move { dx: f64, dy: f64 },
    Scroll { dx: f64, dy: f64 },
    Click,
}

impl PointerOp {
    const fn name(self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Scroll { .. } => "scroll",
            Self::Click => "click",
        }
    }
}

/// Why a session is being closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport went away; nobody is left to tell.
    TransportClosed,
    /// The device dropped the connection.
    RemoteLost(String),
    /// An operation failed in a way the session cannot recover from.
    Fatal(String),
}

/// Receives device state after catalogs have been stripped.
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, state: &DeviceState);
}

/// Observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StateObserver for LogObserver {
    fn on_state_change(&self, state: &DeviceState) {
        tracing::debug!(
            power = ?state.power_state,
            app = ?state.current_app_id,
            volume = ?state.volume,
            "TV state changed"
        );
    }
}

type ObserverSlot = Arc<RwLock<Option<Arc<dyn StateObserver>>>>;

/// Lifecycle manager for one remote session.
///
/// Shared by reference (usually behind an `Arc`) between the relay loop and
/// whatever else may need to close the session; `close` runs at most once.
pub struct SessionLifecycle<R: RemoteSession> {
    session: Mutex<Option<R>>,
    state: watch::Sender<LifecycleState>,
    fault: Arc<watch::Sender<Option<String>>>,
    closing: watch::Sender<bool>,
    observer: ObserverSlot,
    status: mpsc::UnboundedSender<StatusNotification>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl<R: RemoteSession> SessionLifecycle<R> {
    /// Take ownership of `session`. Nothing happens until `open`.
    #[must_use]
    pub fn new(
        session: R,
        status: mpsc::UnboundedSender<StatusNotification>,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        let (fault, _) = watch::channel(None);
        let (closing, _) = watch::channel(false);
        Self {
            session: Mutex::new(Some(session)),
            state,
            fault: Arc::new(fault),
            closing,
            observer: Arc::new(RwLock::new(Some(Arc::new(LogObserver)))),
            status,
            connect_timeout,
            command_timeout,
        }
    }

    /// Replace the state observer.
    pub fn set_observer(&self, observer: Arc<dyn StateObserver>) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = Some(observer);
        }
    }

    /// Remove the state observer.
    pub fn clear_observer(&self) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = None;
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn notify(&self, status: StatusNotification) {
        tracing::info!(%status, "session status");
        let _ = self.status.send(status);
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(?previous, ?next, "session lifecycle transition");
    }

    /// Connect the session.
    ///
    /// Sends the connecting status before touching the session and the
    /// connected status once the handshake completes. A failed connect
    /// closes the session and is not retried. A `close` while connecting
    /// abandons the handshake.
    ///
    /// # Errors
    /// Returns the connect error, `NotConnected` if closed while
    /// connecting, or `Protocol` if already opened.
    pub async fn open(&self) -> Result<(), SessionError> {
        if self.state() != LifecycleState::Idle {
            return Err(SessionError::Protocol("session already opened".into()));
        }
        self.transition(LifecycleState::Connecting);
        self.notify(StatusNotification::Connecting);

        let result = {
            let mut guard = self.session.lock().await;
            let Some(session) = guard.as_mut() else {
                return Err(SessionError::NotConnected);
            };
            session.set_event_callback(self.event_callback());
            let mut closing = self.closing.subscribe();
            tokio::select! {
                result = timeout(self.connect_timeout, session.connect()) => match result {
                    Ok(result) => result,
                    Err(_) => Err(SessionError::Timeout("connect")),
                },
                _ = closing.wait_for(|closing| *closing) => {
                    tracing::debug!("Connect abandoned, session is closing");
                    return Err(SessionError::NotConnected);
                }
            }
        };

        match result {
            Ok(()) => {
                self.transition(LifecycleState::Connected);
                self.notify(StatusNotification::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "TV connect failed");
                self.shutdown().await;
                self.notify(StatusNotification::ConnectFailed(e.to_string()));
                Err(e)
            }
        }
    }

    fn event_callback(&self) -> trackpad_core::EventCallback {
        let observer = Arc::clone(&self.observer);
        let fault = Arc::clone(&self.fault);
        Box::new(move |event: SessionEvent| match event {
            SessionEvent::StateChanged(state) => {
                let reduced = state.without_catalogs();
                if let Ok(slot) = observer.read() {
                    if let Some(observer) = slot.as_ref() {
                        observer.on_state_change(&reduced);
                    }
                }
            }
            SessionEvent::Disconnected { reason } => {
                tracing::warn!(%reason, "TV dropped the connection");
                fault.send_replace(Some(reason));
            }
        })
    }

    /// Run one pointer operation, bounded by the command timeout.
    ///
    /// # Errors
    /// `NotConnected` outside the connected state, `Timeout` on expiry,
    /// or whatever the session reports.
    pub async fn dispatch(&self, op: PointerOp) -> Result<(), SessionError> {
        if self.state() != LifecycleState::Connected {
            return Err(SessionError::NotConnected);
        }
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(SessionError::NotConnected)?;

        let fut = match op {
            PointerOp::Move { dx, dy } => session.move_pointer(dx, dy),
            PointerOp::Scroll { dx, dy } => session.scroll(dx, dy),
            PointerOp::Click => session.click(),
        };
        timeout(self.command_timeout, fut)
            .await
            .map_err(|_| SessionError::Timeout(op.name()))?
    }

    /// Resolve once the device reports that it went away.
    pub async fn fault(&self) -> String {
        let mut rx = self.fault.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Gracefully close the session.
    ///
    /// Returns true if this call closed it, false if it was already closed.
    pub async fn close(&self, reason: CloseReason) -> bool {
        self.closing.send_replace(true);
        if !self.shutdown().await {
            return false;
        }
        match reason {
            CloseReason::TransportClosed => {}
            CloseReason::RemoteLost(reason) | CloseReason::Fatal(reason) => {
                self.notify(StatusNotification::Disconnected(reason));
            }
        }
        true
    }

    async fn shutdown(&self) -> bool {
        let Some(mut session) = self.session.lock().await.take() else {
            return false;
        };
        match timeout(self.connect_timeout, session.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "TV disconnect failed"),
            Err(_) => tracing::warn!("TV disconnect timed out"),
        }
        self.transition(LifecycleState::Closed);
        true
    }
}
