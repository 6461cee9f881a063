//! Integration tests for the WebSocket link against a local relay stub.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use localpush_api::wire::{Frame, RegisterFrame, Sender};
use localpush_api::{Connector, Endpoint, Error, NetworkConnector, Scheme, TlsMode};

// ── Helpers ─────────────────────────────────────────────────────────

async fn local_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn ws_endpoint(port: u16) -> Endpoint {
    Endpoint {
        scheme: Scheme::Ws,
        host: "127.0.0.1".into(),
        port,
        path: "/ws".into(),
        tls: TlsMode::System,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn register_then_receive_message() {
    let (listener, port) = local_listener().await;

    let relay = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let Some(Ok(Message::Text(register))) = ws.next().await else {
            panic!("expected register frame");
        };
        let register: RegisterFrame = serde_json::from_str(register.as_str()).unwrap();
        assert_eq!(register.sender.connector_id, "user-1");

        ws.send(Message::Text(
            r#"{"Notification":{"Title":"Hi","Body":"there"}}"#.into(),
        ))
        .await
        .unwrap();
        ws.close(None).await.unwrap();
    });

    let mut link = NetworkConnector::default()
        .connect(&ws_endpoint(port))
        .await
        .unwrap();

    let register = RegisterFrame::new(
        3,
        Sender {
            connector_id: "user-1".into(),
            connector_tag: "tag".into(),
            device_id: "device".into(),
        },
    );
    link.send_text(register.encode().unwrap()).await.unwrap();

    let text = link.next_text().await.unwrap().unwrap();
    let Frame::Message(msg) = Frame::decode(&text).unwrap() else {
        panic!("expected message frame");
    };
    assert_eq!(msg.notification.title, "Hi");

    // Relay closes: surfaced as a Closed error so the session reconnects.
    let closed = link.next_text().await;
    assert!(matches!(closed, Some(Err(Error::Closed { .. })) | None));

    relay.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_transient() {
    // Bind then drop to get a port with nothing listening.
    let (listener, port) = local_listener().await;
    drop(listener);

    let err = NetworkConnector::default()
        .connect(&ws_endpoint(port))
        .await
        .err()
        .unwrap();
    assert!(err.is_transient(), "unexpected permanent error: {err}");
}

#[tokio::test]
async fn handshake_is_bounded() {
    // Accept TCP but never answer the upgrade.
    let (listener, port) = local_listener().await;
    let _hold = tokio::spawn(async move {
        let (_tcp, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let err = NetworkConnector::new(Duration::from_millis(200))
        .connect(&ws_endpoint(port))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::HandshakeTimeout { timeout_ms: 200 }));
}
