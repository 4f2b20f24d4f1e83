//! Exercises `WebOsClient` against an in-process fake TV.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::mpsc,
};
use tokio_native_tls::TlsAcceptor;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use trackpad_core::{RemoteSession, SessionEvent, SessionState};
use trackpad_webos::{
    WebOsClient, WebOsConfig,
    protocol::{REGISTER_ID, uri},
};

const KEY: &str = "0123456789abcdef";

struct FakeTv {
    port: u16,
    secure: bool,
    pointer_frames: mpsc::UnboundedReceiver<String>,
    /// Dropping this closes the control socket from the TV side.
    hang_up: mpsc::UnboundedSender<()>,
}

fn tls_acceptor() -> TlsAcceptor {
    let identity = native_tls::Identity::from_pkcs8(
        include_bytes!("fixtures/tv-cert.pem"),
        include_bytes!("fixtures/tv-key.pem"),
    )
    .unwrap();
    TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap())
}

/// Fake TV serving plain `ws://`, or `wss://` with a self-signed certificate.
async fn spawn_fake_tv(secure: bool) -> FakeTv {
    let control = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let pointer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = control.local_addr().unwrap().port();
    let scheme = if secure { "wss" } else { "ws" };
    let pointer_url = format!("{scheme}://{}/", pointer.local_addr().unwrap());
    let acceptor = secure.then(tls_acceptor);

    let (frame_tx, pointer_frames) = mpsc::unbounded_channel();
    let pointer_tls = acceptor.clone();
    tokio::spawn(async move {
        let (stream, _) = pointer.accept().await.unwrap();
        match pointer_tls {
            Some(tls) => serve_pointer(tls.accept(stream).await.unwrap(), frame_tx).await,
            None => serve_pointer(stream, frame_tx).await,
        }
    });

    let (hang_up, hang_up_rx) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        let (stream, _) = control.accept().await.unwrap();
        match acceptor {
            Some(tls) => {
                let stream = tls.accept(stream).await.unwrap();
                serve_control(stream, &pointer_url, hang_up_rx).await;
            }
            None => serve_control(stream, &pointer_url, hang_up_rx).await,
        }
    });

    FakeTv {
        port,
        secure,
        pointer_frames,
        hang_up,
    }
}

async fn serve_pointer<S>(stream: S, frames: mpsc::UnboundedSender<String>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ws = accept_async(stream).await.unwrap();
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            let _ = frames.send(text.as_str().to_string());
        }
    }
}

async fn serve_control<S>(
    stream: S,
    pointer_url: &str,
    mut hang_up: mpsc::UnboundedReceiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ws = accept_async(stream).await.unwrap();
    loop {
        tokio::select! {
            msg = ws.next() => {
                let Some(Ok(Message::Text(text))) = msg else { break };
                let request: Value = serde_json::from_str(text.as_str()).unwrap();
                let reply = answer(&request, pointer_url);
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
            }
            signal = hang_up.recv() => {
                if signal.is_none() {
                    let _ = ws.close(None).await;
                    break;
                }
            }
        }
    }
}

fn answer(request: &Value, pointer_url: &str) -> Value {
    let id = request["id"].clone();
    if request["type"] == "register" {
        if request["payload"]["client-key"] == KEY {
            return json!({"type": "registered", "id": REGISTER_ID, "payload": {"client-key": KEY}});
        }
        return json!({"type": "error", "id": REGISTER_ID, "error": "403 bad key", "payload": {}});
    }
    match request["uri"].as_str() {
        Some(uri::POINTER_SOCKET) => json!({
            "type": "response",
            "id": id,
            "payload": {"returnValue": true, "socketPath": pointer_url}
        }),
        Some(uri::FOREGROUND_APP) => json!({
            "type": "response",
            "id": id,
            "payload": {"returnValue": true, "appId": "com.webos.app.hdmi1"}
        }),
        Some(uri::LIST_APPS) => json!({
            "type": "response",
            "id": id,
            "payload": {"returnValue": true, "apps": [{"id": "netflix"}]}
        }),
        _ => json!({"type": "error", "id": id, "error": "404 no such service", "payload": {}}),
    }
}

async fn next_frame(tv: &mut FakeTv) -> String {
    tokio::time::timeout(Duration::from_secs(5), tv.pointer_frames.recv())
        .await
        .expect("pointer frame in time")
        .expect("pointer socket open")
}

fn client_for(tv: &FakeTv, key: &str) -> WebOsClient {
    WebOsClient::new(WebOsConfig {
        host: "127.0.0.1".into(),
        port: tv.port,
        secure: tv.secure,
        client_key: key.into(),
    })
}

#[tokio::test]
async fn test_connect_and_send_pointer_frames() {
    let mut tv = spawn_fake_tv(false).await;
    let mut client = client_for(&tv, KEY);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    client.set_event_callback(Box::new(move |event: SessionEvent| {
        sink.lock().unwrap().push(event);
    }));

    client.connect().await.unwrap();
    assert_eq!(client.state(), SessionState::Connected);

    client.click().await.unwrap();
    client.move_pointer(3.0, 4.0).await.unwrap();
    client.scroll(0.0, -12.5).await.unwrap();

    assert_eq!(next_frame(&mut tv).await, "type:click\n\n");
    assert_eq!(next_frame(&mut tv).await, "type:move\ndx:3\ndy:4\ndown:0\n\n");
    assert_eq!(next_frame(&mut tv).await, "type:scroll\ndx:0\ndy:-12.5\n\n");

    // Subscription replies arrive asynchronously.
    for _ in 0..50 {
        if client.device_state().current_app_id.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        client.device_state().current_app_id.as_deref(),
        Some("com.webos.app.hdmi1")
    );
    assert!(
        events
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, SessionEvent::StateChanged(_)))
    );

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_secure_sockets_accept_self_signed_certificate() {
    let mut tv = spawn_fake_tv(true).await;
    let mut client = client_for(&tv, KEY);

    client.connect().await.unwrap();
    assert_eq!(client.state(), SessionState::Connected);

    client.click().await.unwrap();
    client.move_pointer(-1.0, 2.0).await.unwrap();
    assert_eq!(next_frame(&mut tv).await, "type:click\n\n");
    assert_eq!(next_frame(&mut tv).await, "type:move\ndx:-1\ndy:2\ndown:0\n\n");

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_rejected_key_fails_connect() {
    let tv = spawn_fake_tv(false).await;
    let mut client = client_for(&tv, "wrong-key");

    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("403 bad key"), "{err}");
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_tv_hang_up_reports_disconnect() {
    let tv = spawn_fake_tv(false).await;
    let mut client = client_for(&tv, KEY);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    client.set_event_callback(Box::new(move |event: SessionEvent| {
        if matches!(event, SessionEvent::Disconnected { .. }) {
            let _ = event_tx.send(event);
        }
    }));
    client.connect().await.unwrap();

    let FakeTv { hang_up, .. } = tv;
    drop(hang_up);

    let event = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
        .await
        .unwrap();
    assert!(matches!(event, Some(SessionEvent::Disconnected { .. })));
}

#[tokio::test]
async fn test_unreachable_tv() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = WebOsClient::new(WebOsConfig {
        host: "127.0.0.1".into(),
        port,
        secure: false,
        client_key: KEY.into(),
    });
    assert!(client.connect().await.is_err());
}
