// Link abstraction shared by the WebSocket and TCP+TLS transports.
//
// The session loop in localpush-core only ever sees `Box<dyn Link>`;
// which concrete transport sits behind it is decided here from the
// endpoint scheme.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use strum::{Display, EnumString};
use url::Url;

use crate::error::Error;

/// Default bound on TCP + TLS + upgrade handshake time.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Transport flavour for a relay endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Scheme {
    /// Plain WebSocket.
    Ws,
    /// WebSocket over TLS.
    Wss,
    /// Newline-delimited frames over a TLS-wrapped TCP stream.
    TcpTls,
}

impl Scheme {
    pub fn uses_tls(self) -> bool {
        matches!(self, Self::Wss | Self::TcpTls)
    }
}

/// TLS verification mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify against the bundled webpki root store.
    #[default]
    System,
    /// Verify against a custom CA certificate (PEM).
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed relays on a LAN).
    DangerAcceptInvalid,
}

/// Fully resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// WebSocket path; ignored for TCP.
    pub path: String,
    pub tls: TlsMode,
}

impl Endpoint {
    /// `ws[s]://host:port/path`
    pub fn url(&self) -> Result<Url, Error> {
        self.validate()?;
        let scheme = match self.scheme {
            Scheme::Wss => "wss",
            Scheme::Ws | Scheme::TcpTls => "ws",
        };
        let path = if self.path.starts_with('/') || self.path.is_empty() {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        Ok(Url::parse(&format!(
            "{scheme}://{}:{}{path}",
            self.host, self.port
        ))?)
    }

    /// `host:port`, used for TCP connects and log fields.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidEndpoint("host is empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidEndpoint("port must be non-zero".into()));
        }
        Ok(())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scheme {
            Scheme::TcpTls => write!(f, "tcp+tls://{}", self.authority()),
            Scheme::Ws | Scheme::Wss => match self.url() {
                Ok(url) => write!(f, "{url}"),
                Err(_) => write!(f, "{}://{}", self.scheme, self.authority()),
            },
        }
    }
}

// ── Link ─────────────────────────────────────────────────────────────

/// An established, bidirectional text-frame link to the relay.
///
/// `next_text` must be cancel-safe: the session loop races it against
/// heartbeat ticks and cancellation.
#[async_trait]
pub trait Link: Send {
    async fn send_text(&mut self, text: String) -> Result<(), Error>;

    /// Next inbound text frame. `None` means the stream ended cleanly.
    async fn next_text(&mut self) -> Option<Result<String, Error>>;

    /// Close gracefully. Errors are logged, not returned.
    async fn close(&mut self);
}

/// Opens links. The production implementation is [`NetworkConnector`];
/// tests substitute in-memory links.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Link>, Error>;
}

/// Connects over the network with a bounded handshake.
#[derive(Debug, Clone)]
pub struct NetworkConnector {
    handshake_timeout: Duration,
}

impl NetworkConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for NetworkConnector {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

#[async_trait]
impl Connector for NetworkConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Link>, Error> {
        endpoint.validate()?;
        tracing::info!(endpoint = %endpoint, "connecting to relay");

        let attempt = async {
            match endpoint.scheme {
                Scheme::Ws | Scheme::Wss => crate::websocket::connect(endpoint)
                    .await
                    .map(|link| Box::new(link) as Box<dyn Link>),
                Scheme::TcpTls => crate::tcp::connect(endpoint)
                    .await
                    .map(|link| Box::new(link) as Box<dyn Link>),
            }
        };

        tokio::time::timeout(self.handshake_timeout, attempt)
            .await
            .map_err(|_| Error::HandshakeTimeout {
                timeout_ms: u64::try_from(self.handshake_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoint(scheme: Scheme, path: &str) -> Endpoint {
        Endpoint {
            scheme,
            host: "relay.example.com".into(),
            port: 443,
            path: path.into(),
            tls: TlsMode::System,
        }
    }

    #[test]
    fn wss_url_drops_default_port() {
        let url = endpoint(Scheme::Wss, "/ws").url().unwrap();
        assert_eq!(url.as_str(), "wss://relay.example.com/ws");
    }

    #[test]
    fn path_gets_leading_slash() {
        let url = endpoint(Scheme::Ws, "events").url().unwrap();
        assert_eq!(url.as_str(), "ws://relay.example.com:443/events");
    }

    #[test]
    fn empty_host_is_rejected() {
        let mut ep = endpoint(Scheme::Ws, "/");
        ep.host = " ".into();
        assert!(matches!(ep.validate(), Err(Error::InvalidEndpoint(_))));
    }

    #[test]
    fn scheme_round_trips_through_strings() {
        assert_eq!("tcp-tls".parse::<Scheme>().unwrap(), Scheme::TcpTls);
        assert_eq!(Scheme::Wss.to_string(), "wss");
        assert!(Scheme::TcpTls.uses_tls());
        assert!(!Scheme::Ws.uses_tls());
    }

    #[test]
    fn tcp_display_uses_authority() {
        let ep = endpoint(Scheme::TcpTls, "/ignored");
        assert_eq!(ep.to_string(), "tcp+tls://relay.example.com:443");
    }

    #[tokio::test]
    async fn connect_to_invalid_endpoint_fails_fast() {
        let mut ep = endpoint(Scheme::Ws, "/");
        ep.port = 0;
        let result = NetworkConnector::default().connect(&ep).await;
        assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
    }
}
