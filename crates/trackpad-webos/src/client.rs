//! webOS remote session.
//!
//! Two WebSockets per session: the SSAP control socket (registration,
//! requests, subscriptions) and the pointer input socket whose URL the TV
//! hands out after registration.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::{Message, protocol::CloseFrame},
};
use trackpad_core::{
    BridgeConfig, DeviceState,
    traits::{EventCallback, RemoteSession, SessionError, SessionEvent, SessionState},
};

use crate::protocol::{
    self, CATALOGS, PointerFrame, REGISTER_ID, Request, Response, SUBSCRIPTIONS, uri,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Where and how to reach the TV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebOsConfig {
    pub host: String,
    pub port: u16,
    /// Connect over `wss://`.
    pub secure: bool,
    pub client_key: String,
}

impl WebOsConfig {
    #[must_use]
    pub fn from_bridge(config: &BridgeConfig) -> Self {
        Self {
            host: config.tv_ip.clone(),
            port: config.tv_port(),
            secure: config.tv_secure,
            client_key: config.client_key.clone(),
        }
    }

    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/", self.host, self.port)
    }
}

/// Open a WebSocket to the TV. TVs present self-signed certificates, so
/// `wss://` skips certificate and hostname checks.
async fn open_socket(url: &str) -> Result<WsStream, String> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| format!("TLS setup failed: {e}"))?;
    let (socket, _) =
        connect_async_tls_with_config(url, None, false, Some(Connector::NativeTls(tls)))
            .await
            .map_err(|e| e.to_string())?;
    Ok(socket)
}

/// State shared with the socket reader tasks.
#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<String, oneshot::Sender<Response>>>,
    /// Request id to service URI for state-bearing replies.
    subscriptions: Mutex<HashMap<String, &'static str>>,
    device: Mutex<DeviceState>,
    callback: Mutex<Option<EventCallback>>,
    closing: AtomicBool,
    next_id: AtomicU64,
}

impl Shared {
    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn emit(&self, event: SessionEvent) {
        if let Ok(slot) = self.callback.lock() {
            if let Some(callback) = slot.as_ref() {
                callback(event);
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let response: Response = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Unparseable message from TV: {e}");
                return;
            }
        };
        let Some(id) = response.id.clone() else {
            return;
        };

        // With a valid key the TV answers "registered" straight away; a plain
        // "response" means it is showing the pairing prompt.
        if id == REGISTER_ID && response.kind == "response" {
            tracing::info!("TV is prompting for pairing, waiting for user");
            return;
        }

        let waiter = self.pending.lock().ok().and_then(|mut p| p.remove(&id));
        if let Some(tx) = waiter {
            let _ = tx.send(response);
            return;
        }

        let service = self
            .subscriptions
            .lock()
            .ok()
            .and_then(|s| s.get(&id).copied());
        let Some(service) = service else {
            tracing::trace!(%id, "Reply for unknown request");
            return;
        };
        if response.is_error() {
            tracing::debug!(service, error = %response.error_text(), "TV rejected subscription");
            return;
        }

        let snapshot = {
            let Ok(mut device) = self.device.lock() else {
                return;
            };
            protocol::apply_update(&mut device, service, &response.payload).then(|| device.clone())
        };
        if let Some(state) = snapshot {
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn connection_lost(&self, socket: &str, reason: String) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!(socket, %reason, "TV socket closed");
        self.emit(SessionEvent::Disconnected { reason });
    }
}

fn close_reason(frame: Option<CloseFrame>) -> String {
    frame
        .map(|f| f.reason.as_str().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "closed by TV".to_string())
}

async fn control_reader(mut stream: SplitStream<WsStream>, shared: Arc<Shared>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => shared.handle_text(text.as_str()),
            Some(Ok(Message::Close(frame))) => break close_reason(frame),
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        }
    };
    shared.connection_lost("control", reason);
}

/// The pointer socket carries nothing we need; keep reading so pings are answered.
async fn pointer_reader(mut stream: SplitStream<WsStream>, shared: Arc<Shared>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Close(frame))) => break close_reason(frame),
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed".to_string(),
        }
    };
    shared.connection_lost("pointer", reason);
}

/// `RemoteSession` for LG webOS televisions.
pub struct WebOsClient {
    config: WebOsConfig,
    shared: Arc<Shared>,
    control: Option<WsSink>,
    pointer: Option<WsSink>,
    tasks: Vec<JoinHandle<()>>,
    state: SessionState,
}

impl WebOsClient {
    #[must_use]
    pub fn new(config: WebOsConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            control: None,
            pointer: None,
            tasks: Vec::new(),
            state: SessionState::Disconnected,
        }
    }

    /// Last known device state.
    #[must_use]
    pub fn device_state(&self) -> DeviceState {
        self.shared
            .device
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    async fn send_control(&mut self, request: &Request) -> Result<(), SessionError> {
        let sink = self.control.as_mut().ok_or(SessionError::NotConnected)?;
        let json = serde_json::to_string(request)
            .map_err(|e| SessionError::Protocol(e.to_string()))?;
        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| SessionError::ConnectionLost(e.to_string()))
    }

    /// Send a request and wait for the reply with the same id.
    async fn call(&mut self, request: Request) -> Result<Response, SessionError> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.insert(request.id.clone(), tx);
        }
        self.send_control(&request).await?;

        let response = rx
            .await
            .map_err(|_| SessionError::ConnectionLost("control socket closed".into()))?;
        if response.is_error() {
            return Err(SessionError::Protocol(response.error_text()));
        }
        Ok(response)
    }

    async fn track(&mut self, request: Request) -> Result<(), SessionError> {
        let service = request.uri.unwrap_or_default();
        if let Ok(mut subscriptions) = self.shared.subscriptions.lock() {
            subscriptions.insert(request.id.clone(), service);
        }
        self.send_control(&request).await
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        let socket = open_socket(&self.config.url())
            .await
            .map_err(SessionError::Connect)?;
        let (sink, stream) = socket.split();
        self.control = Some(sink);
        self.tasks
            .push(tokio::spawn(control_reader(stream, Arc::clone(&self.shared))));

        let registered = self.call(Request::register(&self.config.client_key)).await?;
        if registered.kind != "registered" {
            return Err(SessionError::Connect(format!(
                "unexpected registration reply: {}",
                registered.kind
            )));
        }
        tracing::debug!("Registered with TV");

        let reply = self
            .call(Request::request(self.shared.next_id(), uri::POINTER_SOCKET))
            .await?;
        let socket_path = reply
            .socket_path()
            .ok_or_else(|| SessionError::Protocol("no pointer socket path".into()))?
            .to_string();
        let socket = open_socket(&socket_path)
            .await
            .map_err(|e| SessionError::Connect(format!("pointer socket: {e}")))?;
        let (sink, stream) = socket.split();
        self.pointer = Some(sink);
        self.tasks
            .push(tokio::spawn(pointer_reader(stream, Arc::clone(&self.shared))));

        for service in SUBSCRIPTIONS {
            self.track(Request::subscribe(self.shared.next_id(), service)).await?;
        }
        for service in CATALOGS {
            self.track(Request::request(self.shared.next_id(), service)).await?;
        }
        Ok(())
    }

    async fn teardown(&mut self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        if let Some(mut sink) = self.pointer.take() {
            let _ = sink.close().await;
        }
        if let Some(mut sink) = self.control.take() {
            let _ = sink.close().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.clear();
        }
        if let Ok(mut subscriptions) = self.shared.subscriptions.lock() {
            subscriptions.clear();
        }
    }

    async fn send_pointer(&mut self, frame: PointerFrame) -> Result<(), SessionError> {
        if self.state != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let sink = self.pointer.as_mut().ok_or(SessionError::NotConnected)?;
        sink.send(Message::Text(frame.encode().into()))
            .await
            .map_err(|e| SessionError::ConnectionLost(e.to_string()))
    }
}

#[async_trait]
impl RemoteSession for WebOsClient {
    async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Connected {
            return Ok(());
        }
        self.state = SessionState::Connecting;
        self.shared.closing.store(false, Ordering::SeqCst);
        tracing::info!(url = %self.config.url(), "Connecting to TV");

        match self.handshake().await {
            Ok(()) => {
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.teardown().await;
                self.state = SessionState::Disconnected;
                Err(match e {
                    SessionError::Connect(_) => e,
                    other => SessionError::Connect(other.to_string()),
                })
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected && self.control.is_none() {
            return Ok(());
        }
        self.state = SessionState::Closing;
        self.teardown().await;
        self.state = SessionState::Disconnected;
        tracing::info!("Disconnected from TV");
        Ok(())
    }

    async fn move_pointer(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.send_pointer(PointerFrame::Move { dx, dy, drag: false }).await
    }

    async fn scroll(&mut self, dx: f64, dy: f64) -> Result<(), SessionError> {
        self.send_pointer(PointerFrame::Scroll { dx, dy }).await
    }

    async fn click(&mut self) -> Result<(), SessionError> {
        self.send_pointer(PointerFrame::Click).await
    }

    fn set_event_callback(&mut self, callback: EventCallback) {
        if let Ok(mut slot) = self.shared.callback.lock() {
            *slot = Some(callback);
        }
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl Drop for WebOsClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_bridge() {
        let mut bridge = BridgeConfig::new("192.168.1.30", "key");
        let config = WebOsConfig::from_bridge(&bridge);
        assert_eq!(config.url(), "wss://192.168.1.30:3001/");
        assert_eq!(config.client_key, "key");

        bridge.tv_secure = false;
        assert_eq!(WebOsConfig::from_bridge(&bridge).url(), "ws://192.168.1.30:3000/");
    }

    #[tokio::test]
    async fn test_pointer_before_connect() {
        let mut client = WebOsClient::new(WebOsConfig {
            host: "127.0.0.1".into(),
            port: 1,
            secure: false,
            client_key: "k".into(),
        });
        let err = client.click().await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        tokio_test::assert_ok!(client.disconnect().await);
    }

    #[test]
    fn test_state_replies_update_device() {
        let shared = Shared::default();
        shared
            .subscriptions
            .lock()
            .unwrap()
            .insert("7".into(), uri::FOREGROUND_APP);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        *shared.callback.lock().unwrap() = Some(Box::new(move |event: SessionEvent| {
            sink.lock().unwrap().push(event);
        }));

        shared.handle_text(r#"{"type":"response","id":"7","payload":{"appId":"netflix"}}"#);
        shared.handle_text(r#"{"type":"response","id":"7","payload":{"appId":"netflix"}}"#);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            SessionEvent::StateChanged(state) if state.current_app_id.as_deref() == Some("netflix")
        ));
    }

    #[test]
    fn test_close_after_disconnect_is_silent() {
        let shared = Shared::default();
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        *shared.callback.lock().unwrap() = Some(Box::new(move |_: SessionEvent| {
            *counter.lock().unwrap() += 1;
        }));

        shared.closing.store(true, Ordering::SeqCst);
        shared.connection_lost("control", "bye".into());
        assert_eq!(*seen.lock().unwrap(), 0);

        shared.closing.store(false, Ordering::SeqCst);
        shared.connection_lost("control", "bye".into());
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
