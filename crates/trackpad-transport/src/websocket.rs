//! WebSocket endpoint for browser trackpads.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use trackpad_core::RemoteSession;
use trackpad_session::StatusNotification;
use uuid::Uuid;

use crate::{
    protocol::{Inbound, TransportError},
    relay::{CommandRelay, RelayTimeouts},
};

/// Creates one remote session per accepted connection.
pub trait SessionFactory: Send + Sync + 'static {
    type Session: RemoteSession + 'static;

    fn create(&self) -> Self::Session;
}

impl<F, R> SessionFactory for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: RemoteSession + 'static,
{
    type Session = R;

    fn create(&self) -> R {
        self()
    }
}

/// Router state: how to build sessions and how long to wait on them.
pub struct BridgeState<F> {
    pub factory: Arc<F>,
    pub timeouts: RelayTimeouts,
}

impl<F> Clone for BridgeState<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            timeouts: self.timeouts,
        }
    }
}

impl<F: SessionFactory> BridgeState<F> {
    #[must_use]
    pub fn new(factory: F, timeouts: RelayTimeouts) -> Self {
        Self {
            factory: Arc::new(factory),
            timeouts,
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler<F: SessionFactory>(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState<F>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn decode(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
        Message::Binary(data) => Inbound::binary(&data),
        Message::Close(_) => Inbound::Close,
        Message::Ping(_) | Message::Pong(_) => Inbound::Skip,
    }
}

async fn handle_socket<F: SessionFactory>(socket: WebSocket, state: BridgeState<F>) {
    let connection = Uuid::new_v4();
    tracing::info!(%connection, "Trackpad connected");

    let (mut sender, receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<StatusNotification>();

    // Forward status text until the relay drops its sender, then close.
    let send_task = tokio::spawn(async move {
        while let Some(status) = rx.recv().await {
            if sender.send(Message::Text(status.to_string().into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let frames = receiver.map(|message| message.map(decode).map_err(TransportError::from));
    let relay = CommandRelay::new(connection, state.factory.create(), tx, state.timeouts);
    let reason = relay.run(frames).await;
    drop(relay);

    if let Err(e) = send_task.await {
        tracing::error!(%connection, "Status forwarder failed: {e}");
    }
    tracing::info!(%connection, ?reason, "Trackpad disconnected");
}

/// Router serving the trackpad WebSocket at `/ws`.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .route("/", get(index))
///     .merge(create_ws_router(|| RecordingSession::new(), RelayTimeouts::default()));
/// ```
#[must_use]
pub fn create_ws_router<F: SessionFactory>(factory: F, timeouts: RelayTimeouts) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<F>))
        .with_state(BridgeState::new(factory, timeouts))
}
