// ── Inbound messages ──

use chrono::{DateTime, Utc};
use localpush_api::NotificationFrame;
use localpush_api::wire::{self, Frame};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Where a message entered the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MessageSource {
    /// Read from the live relay link.
    Transport,
    /// The OS presented a notification while the app was in front.
    NotificationPresented,
    /// The user tapped a notification (possibly cold-starting the app).
    NotificationTapped,
}

/// Foreground state of the host application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppLifecycle {
    #[default]
    Foreground,
    Background,
}

/// A message on its way to the router. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub title: String,
    pub body: String,
    pub payload: String,
    pub source: MessageSource,
    pub delivered_via_system_notification: bool,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Message read from the relay link.
    pub fn from_frame(frame: NotificationFrame) -> Self {
        Self {
            id: frame.id,
            title: frame.notification.title,
            body: frame.notification.body,
            payload: frame.payload,
            source: MessageSource::Transport,
            delivered_via_system_notification: false,
            received_at: Utc::now(),
        }
    }

    /// Message rebuilt from an OS notification callback.
    ///
    /// A payload built by [`notification_payload`](Self::notification_payload)
    /// resolves to the id of the transport copy. Title and body fall back to
    /// what the OS reported when the payload is opaque.
    pub fn from_notification(
        source: MessageSource,
        payload: String,
        title: Option<String>,
        body: Option<String>,
    ) -> Self {
        let (id, payload) = wire::resolve_callback(payload);
        let (frame_title, frame_body) = match Frame::decode(&payload) {
            Ok(Frame::Message(frame)) => (
                Some(frame.notification.title),
                Some(frame.notification.body),
            ),
            _ => (None, None),
        };

        Self {
            id,
            title: frame_title.or(title).unwrap_or_default(),
            body: frame_body.or(body).unwrap_or_default(),
            payload,
            source,
            delivered_via_system_notification: true,
            received_at: Utc::now(),
        }
    }

    /// Payload to attach to the OS notification raised for this message.
    /// Handing it back through a callback resolves to this message's id.
    pub fn notification_payload(&self) -> String {
        wire::tag_payload(&self.id, &self.payload)
    }

    /// Shape handed to the application.
    pub fn to_message_system(&self) -> MessageSystem {
        MessageSystem {
            from_notification: self.source == MessageSource::NotificationTapped,
            message: MessageResponse {
                notification: NotificationContent {
                    title: self.title.clone(),
                    body: self.body.clone(),
                },
                payload: self.payload.clone(),
            },
            id: self.id.clone(),
            delivered_via_system_notification: self.delivered_via_system_notification,
            received_at: self.received_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub notification: NotificationContent,
    pub payload: String,
}

/// What the application's `onMessage` receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSystem {
    pub from_notification: bool,
    pub message: MessageResponse,
    pub id: String,
    pub delivered_via_system_notification: bool,
    pub received_at: DateTime<Utc>,
}
