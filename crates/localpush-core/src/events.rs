// ── Platform events ──
//
// OS callbacks (notification presented / tapped, app lifecycle) and the
// live transport all post into one queue. A single pump task drains it
// into the router, so the router sees every source in arrival order.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::model::{AppLifecycle, InboundMessage, MessageSource};
use crate::router::MessageRouter;

/// Something the host platform observed.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Message(InboundMessage),
    Lifecycle(AppLifecycle),
}

/// Handle the host registers its OS callbacks against.
///
/// Cheap to clone and never blocks, so it can be called straight from
/// a callback thread.
#[derive(Debug, Clone)]
pub struct PlatformHooks {
    tx: mpsc::UnboundedSender<PlatformEvent>,
}

impl PlatformHooks {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlatformEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// The user tapped a notification. `payload` is the text the
    /// notification was raised with.
    pub fn notification_tapped(
        &self,
        payload: impl Into<String>,
        title: Option<String>,
        body: Option<String>,
    ) {
        self.post(PlatformEvent::Message(InboundMessage::from_notification(
            MessageSource::NotificationTapped,
            payload.into(),
            title,
            body,
        )));
    }

    /// The OS is about to present a notification while the app is open.
    pub fn notification_presented(
        &self,
        payload: impl Into<String>,
        title: Option<String>,
        body: Option<String>,
    ) {
        self.post(PlatformEvent::Message(InboundMessage::from_notification(
            MessageSource::NotificationPresented,
            payload.into(),
            title,
            body,
        )));
    }

    pub fn lifecycle_changed(&self, lifecycle: AppLifecycle) {
        self.post(PlatformEvent::Lifecycle(lifecycle));
    }

    /// Used by the session loop for messages read off the link.
    pub fn transport_message(&self, message: InboundMessage) {
        self.post(PlatformEvent::Message(message));
    }

    pub fn post(&self, event: PlatformEvent) {
        if self.tx.send(event).is_err() {
            debug!("platform event dropped: pump has stopped");
        }
    }
}

/// Drain platform events into the router until cancelled.
pub fn spawn_event_pump(
    mut rx: mpsc::UnboundedReceiver<PlatformEvent>,
    router: MessageRouter,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        PlatformEvent::Message(message) => {
                            trace!(id = %message.id, "pumping message");
                            router.deliver(message);
                        }
                        PlatformEvent::Lifecycle(lifecycle) => router.set_lifecycle(lifecycle),
                    }
                }
            }
        }
        debug!("platform event pump stopped");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::router::{RouterOptions, TracingNotifier};

    #[tokio::test]
    async fn hooks_feed_the_router() {
        let router = MessageRouter::new(&RouterOptions::default(), Arc::new(TracingNotifier));
        let (hooks, rx) = PlatformHooks::channel();
        let cancel = CancellationToken::new();
        let pump = spawn_event_pump(rx, router.clone(), cancel.clone());
        let mut app = router.attach();

        hooks.lifecycle_changed(AppLifecycle::Background);
        hooks.notification_tapped(
            r#"{"Notification":{"Title":"Cold","Body":"start"}}"#,
            None,
            None,
        );

        let msg = app.recv().await.unwrap();
        assert!(msg.from_notification);
        assert_eq!(msg.message.notification.title, "Cold");
        assert_eq!(router.lifecycle(), AppLifecycle::Background);

        cancel.cancel();
        pump.await.unwrap();
        // Posting after shutdown is harmless.
        hooks.lifecycle_changed(AppLifecycle::Foreground);
    }
}
