//! Relay wire format.
//!
//! Every frame is a UTF-8 JSON object. Outbound frames carry a
//! `messageType` discriminator (`register`, `ping`); inbound frames are
//! either a heartbeat reply (`{"pong": ...}`) or a push message carrying a
//! `Notification` object. The raw text of a push message is kept verbatim
//! as its payload.
//!
//! Relay frames usually carry no id, and two frames with the same text are
//! still two messages. Each id-less frame therefore gets a fresh id when it
//! is decoded. The OS notification raised for a message carries a tagged
//! payload ([`tag_payload`]) naming that id, which is what lets a later tap
//! be matched back to the transport copy.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

const MESSAGE_TYPE_REGISTER: &str = "register";
const MESSAGE_TYPE_PING: &str = "ping";

/// Key of the message id in a tagged notification payload.
const TAG_ID: &str = "localpushID";
/// Key of the original payload in a tagged notification payload.
const TAG_PAYLOAD: &str = "payload";

/// Namespace for deriving message ids from payload text.
const PAYLOAD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6c6f_6361_6c70_7573_685f_6d73_6769_6401);

// ── Outbound ─────────────────────────────────────────────────────────

/// Identity announced to the relay right after the link comes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(rename = "connectorID")]
    pub connector_id: String,
    #[serde(rename = "connectorTag")]
    pub connector_tag: String,
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

/// Optional registration data. Only populated by hosts that bridge a
/// vendor push token; desktop hosts send an empty object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apns_token: Option<String>,
    #[serde(
        default,
        rename = "applicationID",
        skip_serializing_if = "Option::is_none"
    )]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apns_server_type: Option<i64>,
}

/// `{"messageType":"register", ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFrame {
    pub message_type: String,
    pub system_type: i64,
    pub sender: Sender,
    pub data: RegisterData,
}

impl RegisterFrame {
    pub fn new(system_type: i64, sender: Sender) -> Self {
        Self {
            message_type: MESSAGE_TYPE_REGISTER.into(),
            system_type,
            sender,
            data: RegisterData::default(),
        }
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PingFrame<'a> {
    message_type: &'a str,
}

/// Encode the heartbeat frame.
pub fn encode_ping() -> String {
    // A single static field cannot fail to serialize.
    serde_json::to_string(&PingFrame {
        message_type: MESSAGE_TYPE_PING,
    })
    .unwrap_or_else(|_| format!(r#"{{"messageType":"{MESSAGE_TYPE_PING}"}}"#))
}

// ── Inbound ──────────────────────────────────────────────────────────

/// Human-visible part of a push message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "Subtitle", default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

/// A push message received from the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFrame {
    /// Message id: explicit when the relay sends one, otherwise fresh
    /// for this frame.
    pub id: String,
    pub notification: Notification,
    /// The frame text exactly as received.
    pub payload: String,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Heartbeat reply.
    Pong(String),
    /// Push message for the application.
    Message(NotificationFrame),
    /// Anything else the relay sends; logged and ignored by consumers.
    Unknown(serde_json::Value),
}

impl Frame {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        if let Some(pong) = value.get("pong") {
            let token = pong
                .as_str()
                .map_or_else(|| pong.to_string(), String::from);
            return Ok(Self::Pong(token));
        }

        match value.get("Notification") {
            Some(raw) if raw.is_object() => {
                let notification: Notification = serde_json::from_value(raw.clone())?;
                Ok(Self::Message(NotificationFrame {
                    id: explicit_id(&value).unwrap_or_else(|| Uuid::new_v4().to_string()),
                    notification,
                    payload: text.to_owned(),
                }))
            }
            _ => Ok(Self::Unknown(value)),
        }
    }
}

fn explicit_id(value: &serde_json::Value) -> Option<String> {
    ["id", "messageID", "MessageID"]
        .iter()
        .find_map(|key| value.get(*key))
        .and_then(|id| match id {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Derive a message id from payload text.
///
/// Only used for callback payloads that name no id, so repeated callbacks
/// for the same untagged notification collapse into one.
pub fn message_id_for_payload(payload: &str) -> String {
    Uuid::new_v5(&PAYLOAD_ID_NAMESPACE, payload.as_bytes()).to_string()
}

/// Payload to attach to the OS notification raised for message `id`.
pub fn tag_payload(id: &str, payload: &str) -> String {
    serde_json::json!({ TAG_ID: id, TAG_PAYLOAD: payload }).to_string()
}

/// Split a payload built by [`tag_payload`] back into `(id, payload)`.
pub fn untag_payload(text: &str) -> Option<(String, String)> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let id = value.get(TAG_ID)?.as_str()?;
    let payload = value.get(TAG_PAYLOAD)?.as_str()?;
    Some((id.to_owned(), payload.to_owned()))
}

/// Resolve `(id, payload)` for a payload handed back by an OS callback.
///
/// Tagged payloads resolve to the id the transport path assigned. Relay
/// frames with an explicit id keep it; anything else falls back to the
/// payload hash.
pub fn resolve_callback(payload: String) -> (String, String) {
    if let Some(tagged) = untag_payload(&payload) {
        return tagged;
    }
    let id = serde_json::from_str::<serde_json::Value>(&payload)
        .ok()
        .and_then(|v| explicit_id(&v))
        .unwrap_or_else(|| message_id_for_payload(&payload));
    (id, payload)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn register_frame_matches_relay_field_names() {
        let frame = RegisterFrame::new(
            1,
            Sender {
                connector_id: "user-42".into(),
                connector_tag: "staff".into(),
                device_id: "dev-1".into(),
            },
        );

        let json: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messageType": "register",
                "systemType": 1,
                "sender": {
                    "connectorID": "user-42",
                    "connectorTag": "staff",
                    "deviceID": "dev-1"
                },
                "data": {}
            })
        );
    }

    #[test]
    fn ping_frame() {
        assert_eq!(encode_ping(), r#"{"messageType":"ping"}"#);
    }

    #[test]
    fn decode_pong() {
        assert_eq!(
            Frame::decode(r#"{"pong":"ok"}"#).unwrap(),
            Frame::Pong("ok".into())
        );
    }

    #[test]
    fn decode_message_keeps_raw_payload() {
        let raw = r#"{"Notification":{"Title":"Door","Body":"Front door opened"},"room":"hall"}"#;
        let Frame::Message(msg) = Frame::decode(raw).unwrap() else {
            panic!("expected message frame");
        };
        assert_eq!(msg.notification.title, "Door");
        assert_eq!(msg.notification.body, "Front door opened");
        assert_eq!(msg.notification.subtitle, None);
        assert_eq!(msg.payload, raw);
        assert!(Uuid::parse_str(&msg.id).is_ok());
    }

    #[test]
    fn identical_idless_frames_get_distinct_ids() {
        let raw = r#"{"Notification":{"Title":"Door","Body":"Opened"}}"#;
        let (Frame::Message(first), Frame::Message(second)) =
            (Frame::decode(raw).unwrap(), Frame::decode(raw).unwrap())
        else {
            panic!("expected message frames");
        };
        assert_ne!(first.id, second.id);
        assert_eq!(first.payload, second.payload);
    }

    #[test]
    fn explicit_id_wins_over_payload_hash() {
        let raw = r#"{"id":"m-17","Notification":{"Title":"t","Body":"b"}}"#;
        let Frame::Message(msg) = Frame::decode(raw).unwrap() else {
            panic!("expected message frame");
        };
        assert_eq!(msg.id, "m-17");
        assert_eq!(resolve_callback(raw.into()), ("m-17".into(), raw.into()));
    }

    #[test]
    fn tagged_callback_resolves_to_transport_id() {
        let raw = r#"{"Notification":{"Title":"t","Body":"b"}}"#;
        let Frame::Message(msg) = Frame::decode(raw).unwrap() else {
            panic!("expected message frame");
        };
        let tagged = tag_payload(&msg.id, &msg.payload);
        assert_eq!(resolve_callback(tagged), (msg.id, raw.to_owned()));
    }

    #[test]
    fn untagged_callbacks_fall_back_to_payload_hash() {
        assert_eq!(
            resolve_callback("opaque".into()),
            (message_id_for_payload("opaque"), "opaque".to_owned())
        );
        assert_eq!(untag_payload(r#"{"payload":"x"}"#), None);
    }

    #[test]
    fn unknown_frames_are_preserved() {
        let frame = Frame::decode(r#"{"messageType":"ack"}"#).unwrap();
        assert!(matches!(frame, Frame::Unknown(v) if v["messageType"] == "ack"));
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(matches!(Frame::decode("not json"), Err(Error::Json(_))));
    }
}
