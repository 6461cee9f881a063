use thiserror::Error;

/// Top-level error type for the `localpush-api` crate.
///
/// Covers every failure mode of a single relay link: endpoint validation,
/// TCP/TLS/WebSocket handshakes, framing, and remote close.
/// `localpush-core` maps these into retryable transport failures.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Endpoint fields that cannot form a connectable target.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    // ── Handshake ───────────────────────────────────────────────────
    /// TCP connect failed (refused, DNS failure, unreachable).
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Local TLS setup the configuration can never satisfy: unreadable
    /// or invalid CA file, bad server name.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// TLS handshake or certificate error reported by the peer exchange.
    #[error("TLS error: {0}")]
    Tls(String),

    /// WebSocket upgrade or protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Handshake did not complete within the configured bound.
    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    // ── Established link ────────────────────────────────────────────
    /// The relay closed the link.
    #[error("Link closed by relay (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// Socket-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded the line limit or was not valid UTF-8.
    #[error("Framing error: {0}")]
    Codec(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON encoding or decoding failed.
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if retrying the connection might succeed.
    ///
    /// Endpoint validation and local TLS setup errors are permanent for a
    /// given configuration; everything that happens on the wire is not.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::InvalidUrl(_) | Self::InvalidEndpoint(_) | Self::TlsConfig(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(e) => Self::Io(e),
            WsError::Tls(e) => Self::Tls(e.to_string()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed {
                code: None,
                reason: "connection closed".into(),
            },
            other => Self::WebSocket(other.to_string()),
        }
    }
}

impl From<tokio_util::codec::LinesCodecError> for Error {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => Self::Io(e),
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                Self::Codec("frame exceeds maximum line length".into())
            }
        }
    }
}
