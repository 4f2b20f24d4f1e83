//! Command relay: one remote session per transport connection.
//!
//! Frames are handled strictly one at a time, so commands reach the session
//! in arrival order with at most one in flight.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use trackpad_core::{BridgeConfig, CommandMessage, FrameError, RemoteSession};
use trackpad_session::{CloseReason, PointerOp, SessionLifecycle, StatusNotification};
use uuid::Uuid;

use crate::protocol::{Inbound, InboundResult};

/// Timeouts applied to the relayed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimeouts {
    pub connect: Duration,
    pub command: Duration,
}

impl RelayTimeouts {
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            connect: config.connect_timeout(),
            command: config.command_timeout(),
        }
    }
}

impl Default for RelayTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            command: Duration::from_secs(2),
        }
    }
}

/// Map a command onto the session operation it drives.
///
/// Long-press and tap both resolve to a click.
#[must_use]
pub const fn pointer_op(command: CommandMessage) -> PointerOp {
    match command {
        CommandMessage::Move { dx, dy } => PointerOp::Move { dx, dy },
        CommandMessage::Scroll { dx, dy } => PointerOp::Scroll { dx, dy },
        CommandMessage::Click | CommandMessage::LongPress => PointerOp::Click,
    }
}

/// Relay between one transport connection and its remote session.
pub struct CommandRelay<R: RemoteSession> {
    connection: Uuid,
    lifecycle: Arc<SessionLifecycle<R>>,
}

impl<R: RemoteSession> Clone for CommandRelay<R> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection,
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<R: RemoteSession> CommandRelay<R> {
    /// Take ownership of `session`; status text goes to `status`.
    #[must_use]
    pub fn new(
        connection: Uuid,
        session: R,
        status: mpsc::UnboundedSender<StatusNotification>,
        timeouts: RelayTimeouts,
    ) -> Self {
        Self {
            connection,
            lifecycle: Arc::new(SessionLifecycle::new(
                session,
                status,
                timeouts.connect,
                timeouts.command,
            )),
        }
    }

    /// The lifecycle manager owning the session.
    #[must_use]
    pub fn lifecycle(&self) -> &SessionLifecycle<R> {
        &self.lifecycle
    }

    /// Open the session, then relay frames until the transport ends, the
    /// device drops, or a command fails fatally. The session is closed
    /// before this returns.
    pub async fn run<S>(&self, mut frames: S) -> CloseReason
    where
        S: Stream<Item = InboundResult> + Unpin,
    {
        let mut queued = VecDeque::new();
        let reason = match self.open(&mut frames, &mut queued).await {
            Ok(()) => self.relay(&mut frames, queued).await,
            Err(reason) => reason,
        };

        tracing::info!(connection = %self.connection, ?reason, "Closing session");
        self.lifecycle.close(reason.clone()).await;
        reason
    }

    /// Connect while watching the transport. Commands that arrive during the
    /// handshake are queued; a transport close abandons the handshake.
    async fn open<S>(
        &self,
        frames: &mut S,
        queued: &mut VecDeque<String>,
    ) -> Result<(), CloseReason>
    where
        S: Stream<Item = InboundResult> + Unpin,
    {
        let open = self.lifecycle.open();
        tokio::pin!(open);
        loop {
            tokio::select! {
                biased;
                opened = &mut open => {
                    return opened.map_err(|e| CloseReason::Fatal(e.to_string()));
                }
                next = frames.next() => match next {
                    Some(Ok(Inbound::Text(text))) => queued.push_back(text),
                    Some(Ok(Inbound::Skip)) => {}
                    Some(Ok(Inbound::Close)) | None => {
                        tracing::debug!(
                            connection = %self.connection,
                            "Transport closed while connecting"
                        );
                        return Err(CloseReason::TransportClosed);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            connection = %self.connection,
                            error = %e,
                            "Transport fault"
                        );
                        return Err(CloseReason::TransportClosed);
                    }
                },
            }
        }
    }

    async fn relay<S>(&self, frames: &mut S, queued: VecDeque<String>) -> CloseReason
    where
        S: Stream<Item = InboundResult> + Unpin,
    {
        for text in queued {
            if let Err(reason) = self.handle_frame(&text).await {
                return reason;
            }
        }

        loop {
            tokio::select! {
                reason = self.lifecycle.fault() => break CloseReason::RemoteLost(reason),
                next = frames.next() => match next {
                    Some(Ok(Inbound::Text(text))) => {
                        if let Err(reason) = self.handle_frame(&text).await {
                            break reason;
                        }
                    }
                    Some(Ok(Inbound::Skip)) => {}
                    Some(Ok(Inbound::Close)) | None => break CloseReason::TransportClosed,
                    Some(Err(e)) => {
                        tracing::warn!(
                            connection = %self.connection,
                            error = %e,
                            "Transport fault"
                        );
                        break CloseReason::TransportClosed;
                    }
                },
            }
        }
    }

    async fn handle_frame(&self, text: &str) -> Result<(), CloseReason> {
        let command = match CommandMessage::parse(text) {
            Ok(command) => command,
            Err(FrameError::UnknownType(kind)) => {
                tracing::debug!(
                    connection = %self.connection,
                    %kind,
                    "Ignoring unknown command type"
                );
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    connection = %self.connection,
                    error = %e,
                    "Dropping malformed frame"
                );
                return Ok(());
            }
        };

        tracing::trace!(connection = %self.connection, kind = command.kind(), "Dispatching");
        let op = pointer_op(command);
        match self.lifecycle.dispatch(op).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(CloseReason::Fatal(e.to_string())),
            Err(e) => {
                tracing::warn!(connection = %self.connection, error = %e, "Command failed");
                Ok(())
            }
        }
    }
}
