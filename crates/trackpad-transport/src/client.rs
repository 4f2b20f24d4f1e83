//! Native trackpad client.
//!
//! Connects to a bridge's `/ws` endpoint, sends command frames and exposes
//! the status text the bridge pushes back.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use trackpad_core::{CommandMessage, CommandSink};

use crate::protocol::TransportError;

/// Status text received from the bridge, in arrival order.
pub type StatusStream = UnboundedReceiverStream<String>;

/// Client end of the transport channel.
///
/// Sending never fails: once the channel is closed, commands are dropped.
pub struct TrackpadClient {
    commands: mpsc::UnboundedSender<CommandMessage>,
    open: Arc<AtomicBool>,
    writer: JoinHandle<()>,
}

impl TrackpadClient {
    /// Connect to `url` (for example `ws://192.168.1.10:8080/ws`).
    ///
    /// # Errors
    /// Returns `TransportError::Connect` if the handshake fails.
    pub async fn connect(url: &str) -> Result<(Self, StatusStream), TransportError> {
        let (socket, _) = connect_async(url).await.map_err(|e| TransportError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let (mut sink, mut stream) = socket.split();
        let open = Arc::new(AtomicBool::new(true));

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let reader_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let _ = status_tx.send(text.as_str().to_owned());
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("Bridge connection error: {e}");
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
        });

        let (commands, mut command_rx) = mpsc::unbounded_channel::<CommandMessage>();
        let writer_open = Arc::clone(&open);
        let writer = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(command.to_json().into())).await {
                    tracing::debug!("Dropping command, bridge connection closed: {e}");
                    break;
                }
            }
            writer_open.store(false, Ordering::SeqCst);
            let _ = sink.close().await;
        });

        Ok((
            Self {
                commands,
                open,
                writer,
            },
            UnboundedReceiverStream::new(status_rx),
        ))
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Flush queued commands and close the connection.
    pub async fn close(self) {
        let Self { commands, writer, .. } = self;
        drop(commands);
        if let Err(e) = writer.await {
            tracing::debug!("Writer task ended abnormally: {e}");
        }
    }
}

impl CommandSink for TrackpadClient {
    fn send_command(&self, command: CommandMessage) {
        if self.is_open() {
            let _ = self.commands.send(command);
        }
    }
}
