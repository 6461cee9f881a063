#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use localpush_api::{Connector, Endpoint, Error, Link};
use localpush_core::{
    AppLifecycle, ConnectionType, CoreError, InboundMessage, LocalPush, MemoryBackend,
    PlatformSettings, SessionState, SystemNotifier, SystemType, TcpMode, UserIdentity,
};
use tokio::sync::mpsc;

const FRAME: &str =
    r#"{"Notification":{"Title":"Door","Body":"Someone is at the door"},"id":"m-1"}"#;
const DOORBELL: &str = r#"{"Notification":{"Title":"Door","Body":"Ring"}}"#;

/// Relay that accepts once and lets the test push frames.
struct ScriptedRelay {
    link: Mutex<Option<ChannelLink>>,
    sent: Arc<Mutex<Vec<String>>>,
}

struct ChannelLink {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Link for ChannelLink {
    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, Error>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl Connector for ScriptedRelay {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Link>, Error> {
        match self.link.lock().unwrap().take() {
            Some(link) => Ok(Box::new(link)),
            None => Err(Error::Connect {
                endpoint: endpoint.to_string(),
                reason: "relay gone".into(),
            }),
        }
    }
}

/// Records the payload every raised notification would carry.
#[derive(Default)]
struct CountingNotifier {
    shown: AtomicUsize,
    payloads: Mutex<Vec<String>>,
}

impl SystemNotifier for CountingNotifier {
    fn show(&self, message: &InboundMessage) -> Result<(), CoreError> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .lock()
            .unwrap()
            .push(message.notification_payload());
        Ok(())
    }
}

async fn connected_in_background(
    relay: Arc<ScriptedRelay>,
    notifier: Arc<CountingNotifier>,
) -> LocalPush {
    let push = LocalPush::builder(Arc::new(MemoryBackend::new()))
        .connector(relay)
        .notifier(notifier)
        .build()
        .unwrap();
    push.initialize(
        SystemType::Linux,
        PlatformSettings::default(),
        TcpMode {
            host: "relay.example.com".into(),
            port: 8080,
            path: Some("/ws".into()),
            public_key: None,
            connection_type: ConnectionType::Ws,
        },
    )
    .await
    .unwrap();
    push.register_user(UserIdentity {
        connector_id: "u-1".into(),
        connector_tag: "alice".into(),
    })
    .await
    .unwrap();

    push.hooks().lifecycle_changed(AppLifecycle::Background);
    push.start().await.unwrap();
    push.status()
        .wait_for(|s| s.state == SessionState::Connected)
        .await
        .unwrap();
    push
}

fn relay() -> (ScriptedRelay, mpsc::UnboundedSender<String>, Arc<Mutex<Vec<String>>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let relay = ScriptedRelay {
        link: Mutex::new(Some(ChannelLink {
            inbound: rx,
            sent: Arc::clone(&sent),
        })),
        sent: Arc::clone(&sent),
    };
    (relay, tx, sent)
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn background_message_and_tap_are_delivered_once() {
    let (relay, push_frame, sent) = relay();
    let relay = Arc::new(relay);
    let notifier = Arc::new(CountingNotifier::default());
    let push = connected_in_background(relay.clone(), notifier.clone()).await;

    wait_for(|| !relay.sent.lock().unwrap().is_empty()).await;
    assert!(sent.lock().unwrap()[0].contains(r#""messageType":"register""#));

    push_frame.send(FRAME.to_owned()).unwrap();
    wait_for(|| push.router().pending() == 1).await;
    assert_eq!(notifier.shown.load(Ordering::SeqCst), 1);

    // The user taps the notification raised for the same frame.
    push.hooks().notification_tapped(FRAME, None, None);
    push.hooks().lifecycle_changed(AppLifecycle::Foreground);
    wait_for(|| push.router().lifecycle() == AppLifecycle::Foreground).await;
    assert_eq!(push.router().pending(), 1);

    let mut app = push.attach();
    let message = app.recv().await.unwrap();
    assert_eq!(message.id, "m-1");
    assert_eq!(message.message.notification.title, "Door");
    assert!(message.delivered_via_system_notification);
    assert!(app.try_recv().is_none());
    assert_eq!(notifier.shown.load(Ordering::SeqCst), 1);

    push.stop().await.unwrap();
    assert_eq!(push.current_status().state, SessionState::Stopped);
    push.shutdown().await;
}

#[tokio::test]
async fn repeated_idless_frames_are_separate_messages() {
    let (relay, push_frame, _sent) = relay();
    let notifier = Arc::new(CountingNotifier::default());
    let push = connected_in_background(Arc::new(relay), notifier.clone()).await;

    // The doorbell rings twice; the relay sends the same text both times.
    push_frame.send(DOORBELL.to_owned()).unwrap();
    push_frame.send(DOORBELL.to_owned()).unwrap();
    wait_for(|| push.router().pending() == 2).await;
    assert_eq!(notifier.shown.load(Ordering::SeqCst), 2);

    // Tapping the first notification matches its transport copy.
    let first_payload = notifier.payloads.lock().unwrap()[0].clone();
    push.hooks().notification_tapped(&first_payload, None, None);
    push.hooks().lifecycle_changed(AppLifecycle::Foreground);
    wait_for(|| push.router().lifecycle() == AppLifecycle::Foreground).await;
    assert_eq!(push.router().pending(), 2);

    let mut app = push.attach();
    let first = app.recv().await.unwrap();
    let second = app.recv().await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(first.message.payload, DOORBELL);
    assert_eq!(second.message.payload, DOORBELL);
    assert!(app.try_recv().is_none());

    push.shutdown().await;
}
