// ── Connection settings ──
//
// `Configuration` is the immutable snapshot every other component reads.
// Updates arrive as a `SettingsPatch` and are folded in with `merge`;
// nothing here touches disk or the network.

use std::fmt;

use localpush_api::wire::{RegisterFrame, Sender};
use localpush_api::{Endpoint, Scheme, TlsMode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::CoreError;

// ── SystemType ───────────────────────────────────────────────────────

/// Host platform, sent to the relay as the integer `systemType`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(try_from = "i64", into = "i64")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SystemType {
    Android,
    Ios,
    Windows,
    Macos,
    Linux,
}

impl SystemType {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Macos
        } else {
            Self::Linux
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Android => 0,
            Self::Ios => 1,
            Self::Windows => 2,
            Self::Macos => 3,
            Self::Linux => 4,
        }
    }

    pub fn is_mobile(self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

impl From<SystemType> for i64 {
    fn from(value: SystemType) -> Self {
        value.code()
    }
}

impl TryFrom<i64> for SystemType {
    type Error = CoreError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Android),
            1 => Ok(Self::Ios),
            2 => Ok(Self::Windows),
            3 => Ok(Self::Macos),
            4 => Ok(Self::Linux),
            other => Err(CoreError::config(format!("unknown systemType {other}"))),
        }
    }
}

// ── ConnectionType ───────────────────────────────────────────────────

/// Transport selection, stored as the `use_tcp` / `wss` flag pair.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ConnectionType {
    Ws,
    #[default]
    Wss,
    TcpTls,
}

impl ConnectionType {
    pub fn from_flags(use_tcp: bool, wss: bool) -> Self {
        match (use_tcp, wss) {
            (true, _) => Self::TcpTls,
            (false, true) => Self::Wss,
            (false, false) => Self::Ws,
        }
    }

    /// `(use_tcp, wss)`
    pub fn flags(self) -> (bool, bool) {
        match self {
            Self::Ws => (false, false),
            Self::Wss => (false, true),
            Self::TcpTls => (true, false),
        }
    }

    pub fn scheme(self) -> Scheme {
        match self {
            Self::Ws => Scheme::Ws,
            Self::Wss => Scheme::Wss,
            Self::TcpTls => Scheme::TcpTls,
        }
    }
}

// ── FieldUpdate ──────────────────────────────────────────────────────

/// One field of a partial update.
///
/// `Retain` keeps the previous value, `Clear` removes it. The two are
/// distinct so callers can unset an optional field without it being
/// mistaken for "not mentioned".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Retain,
    Set(T),
    Clear,
}

impl<T: Clone> FieldUpdate<T> {
    fn apply(&self, current: Option<&T>) -> Option<T> {
        match self {
            Self::Retain => current.cloned(),
            Self::Set(value) => Some(value.clone()),
            Self::Clear => None,
        }
    }

    pub fn is_retain(&self) -> bool {
        matches!(self, Self::Retain)
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    /// `Some` sets, `None` retains.
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Retain, Self::Set)
    }
}

/// A partial update to the settings. Every field defaults to `Retain`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub host: FieldUpdate<String>,
    pub port: FieldUpdate<u16>,
    pub path: FieldUpdate<String>,
    pub connection_type: Option<ConnectionType>,
    pub public_key: FieldUpdate<String>,
    pub connector_id: FieldUpdate<String>,
    pub connector_tag: FieldUpdate<String>,
    pub device_id: FieldUpdate<String>,
    pub system_type: Option<SystemType>,
    pub ssid_allow_list: FieldUpdate<Vec<String>>,
}

impl SettingsPatch {
    /// Replace the user identity in one step.
    pub fn identity(connector_id: impl Into<String>, connector_tag: impl Into<String>) -> Self {
        Self {
            connector_id: FieldUpdate::Set(connector_id.into()),
            connector_tag: FieldUpdate::Set(connector_tag.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// Immutable settings snapshot.
///
/// `generation` increases by one on every successful merge and is
/// persisted with the record, so it keeps counting across restarts.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub use_tcp: bool,
    pub wss: bool,
    pub public_key: Option<String>,
    pub connector_id: Option<String>,
    pub connector_tag: Option<String>,
    pub device_id: Option<String>,
    pub system_type: Option<SystemType>,
    pub ssid_allow_list: Vec<String>,
    pub generation: u64,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("connection_type", &self.connection_type())
            .field("public_key", &self.public_key.as_ref().map(|_| "[REDACTED]"))
            .field("connector_id", &self.connector_id)
            .field("connector_tag", &self.connector_tag)
            .field("device_id", &self.device_id)
            .field("system_type", &self.system_type)
            .field("ssid_allow_list", &self.ssid_allow_list)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Resolved connection target for one session.
#[derive(Debug, Clone)]
pub struct RelayTarget {
    pub endpoint: Endpoint,
    pub public_key: Option<SecretString>,
}

impl Configuration {
    /// Fold `patch` over `self`, producing the next generation.
    pub fn merge(&self, patch: &SettingsPatch) -> Configuration {
        let (use_tcp, wss) = patch
            .connection_type
            .map_or((self.use_tcp, self.wss), ConnectionType::flags);

        Configuration {
            host: patch.host.apply(self.host.as_ref()),
            port: patch.port.apply(self.port.as_ref()),
            path: patch.path.apply(self.path.as_ref()),
            use_tcp,
            wss,
            public_key: patch.public_key.apply(self.public_key.as_ref()),
            connector_id: patch.connector_id.apply(self.connector_id.as_ref()),
            connector_tag: patch.connector_tag.apply(self.connector_tag.as_ref()),
            device_id: patch.device_id.apply(self.device_id.as_ref()),
            system_type: patch.system_type.or(self.system_type),
            ssid_allow_list: patch
                .ssid_allow_list
                .apply(Some(&self.ssid_allow_list))
                .unwrap_or_default(),
            generation: self.generation.saturating_add(1),
        }
    }

    pub fn connection_type(&self) -> ConnectionType {
        ConnectionType::from_flags(self.use_tcp, self.wss)
    }

    /// Whether a relay host has been configured at all.
    pub fn is_configured(&self) -> bool {
        self.host.as_deref().is_some_and(|h| !h.trim().is_empty()) && self.port.is_some()
    }

    /// Same relay, same transport, same credentials.
    ///
    /// Identity fields are deliberately excluded: a session whose target
    /// is unchanged only needs to re-register.
    pub fn same_endpoint(&self, other: &Configuration) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.path == other.path
            && self.use_tcp == other.use_tcp
            && self.wss == other.wss
            && self.public_key == other.public_key
    }

    /// Resolve the connection target.
    pub fn relay_target(&self, tls: &TlsMode) -> Result<RelayTarget, CoreError> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CoreError::config("relay host is not configured"))?;
        let port = self
            .port
            .filter(|p| *p != 0)
            .ok_or_else(|| CoreError::config("relay port is not configured"))?;

        let endpoint = Endpoint {
            scheme: self.connection_type().scheme(),
            host: host.to_owned(),
            port,
            path: self.path.clone().unwrap_or_default(),
            tls: tls.clone(),
        };
        endpoint.validate()?;

        Ok(RelayTarget {
            endpoint,
            public_key: self.public_key.clone().map(SecretString::from),
        })
    }

    /// Register frame for this identity, if one is complete.
    pub fn register_frame(&self) -> Option<RegisterFrame> {
        let connector_id = self.connector_id.as_deref().filter(|s| !s.is_empty())?;
        let connector_tag = self.connector_tag.as_deref().filter(|s| !s.is_empty())?;
        let system_type = self.system_type.unwrap_or_else(SystemType::current);

        Some(RegisterFrame::new(
            system_type.code(),
            Sender {
                connector_id: connector_id.to_owned(),
                connector_tag: connector_tag.to_owned(),
                device_id: self.device_id.clone().unwrap_or_default(),
            },
        ))
    }
}

impl RelayTarget {
    /// Whether the credential matches without exposing it in logs.
    pub fn has_public_key(&self) -> bool {
        self.public_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
    }
}

/// Free-function form of [`Configuration::merge`].
pub fn merge(current: &Configuration, patch: &SettingsPatch) -> Configuration {
    current.merge(patch)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn base() -> Configuration {
        Configuration::default().merge(&SettingsPatch {
            host: FieldUpdate::Set("relay.example.com".into()),
            port: FieldUpdate::Set(443),
            path: FieldUpdate::Set("/ws".into()),
            connection_type: Some(ConnectionType::Wss),
            connector_id: FieldUpdate::Set("user-1".into()),
            connector_tag: FieldUpdate::Set("staff".into()),
            system_type: Some(SystemType::Ios),
            ..SettingsPatch::default()
        })
    }

    #[test]
    fn absent_fields_survive_many_merges() {
        let mut config = base();
        for port in [1000, 2000, 3000] {
            config = config.merge(&SettingsPatch {
                port: FieldUpdate::Set(port),
                ..SettingsPatch::default()
            });
        }
        assert_eq!(config.host.as_deref(), Some("relay.example.com"));
        assert_eq!(config.connector_id.as_deref(), Some("user-1"));
        assert_eq!(config.port, Some(3000));
        assert_eq!(config.generation, 4);
    }

    #[test]
    fn clear_is_distinct_from_retain() {
        let config = base();
        let retained = config.merge(&SettingsPatch::default());
        assert_eq!(retained.connector_tag.as_deref(), Some("staff"));

        let cleared = config.merge(&SettingsPatch {
            connector_tag: FieldUpdate::Clear,
            ..SettingsPatch::default()
        });
        assert_eq!(cleared.connector_tag, None);
        assert_eq!(cleared.connector_id.as_deref(), Some("user-1"));
        assert!(cleared.register_frame().is_none());
    }

    #[test]
    fn connection_type_maps_to_flags() {
        let tcp = base().merge(&SettingsPatch {
            connection_type: Some(ConnectionType::TcpTls),
            ..SettingsPatch::default()
        });
        assert!(tcp.use_tcp);
        assert!(!tcp.wss);
        assert_eq!(tcp.connection_type(), ConnectionType::TcpTls);
        assert_eq!(ConnectionType::from_flags(true, true), ConnectionType::TcpTls);
    }

    #[test]
    fn identity_changes_keep_the_endpoint() {
        let a = base();
        let b = a.merge(&SettingsPatch::identity("user-2", "guest"));
        assert!(a.same_endpoint(&b));

        let c = a.merge(&SettingsPatch {
            path: FieldUpdate::Set("/other".into()),
            ..SettingsPatch::default()
        });
        assert!(!a.same_endpoint(&c));
    }

    #[test]
    fn relay_target_requires_host_and_port() {
        let err = Configuration::default()
            .relay_target(&TlsMode::System)
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));

        let target = base().relay_target(&TlsMode::System).unwrap();
        assert_eq!(target.endpoint.scheme, Scheme::Wss);
        assert_eq!(target.endpoint.to_string(), "wss://relay.example.com/ws");
        assert!(!target.has_public_key());
    }

    #[test]
    fn register_frame_uses_system_type_code() {
        let frame = base().register_frame().unwrap();
        assert_eq!(frame.system_type, 1);
        assert_eq!(frame.sender.connector_id, "user-1");
        assert_eq!(frame.sender.device_id, "");
    }

    #[test]
    fn system_type_codes_round_trip() {
        for code in 0..5 {
            let st = SystemType::try_from(code).unwrap();
            assert_eq!(i64::from(st), code);
        }
        assert!(SystemType::try_from(9).is_err());
        assert_eq!("iOS".parse::<SystemType>().unwrap(), SystemType::Ios);
    }

    #[test]
    fn debug_redacts_public_key() {
        let config = base().merge(&SettingsPatch {
            public_key: FieldUpdate::Set("sha256/abc".into()),
            ..SettingsPatch::default()
        });
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sha256/abc"));
    }
}
