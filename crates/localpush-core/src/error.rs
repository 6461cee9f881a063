// ── Core error types ──
//
// User-facing errors from localpush-core. Consumers never see raw socket
// or JSON failures; the `From<localpush_api::Error>` impl folds them into
// the transport variant and keeps the retry classification.

use thiserror::Error;

use crate::permission::Capability;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors (never retried) ─────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Permission errors (need user action) ─────────────────────────
    #[error("Missing permissions: {}", join_capabilities(.missing))]
    PermissionDenied { missing: Vec<Capability> },

    #[error("Permission request failed: {message}")]
    PermissionUnavailable { message: String },

    // ── Transport errors (retried by the supervisor) ─────────────────
    #[error("Transport error: {message}")]
    Transport { message: String, transient: bool },

    #[error("Connection gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error("Failed to persist settings: {message}")]
    Persistence { message: String },

    // ── Platform seams ───────────────────────────────────────────────
    #[error("Keep-alive unavailable: {message}")]
    KeepAlive { message: String },

    #[error("Notification could not be shown: {message}")]
    Notifier { message: String },

    // ── Lifecycle / internal ─────────────────────────────────────────
    #[error("Connection supervisor is not running")]
    SupervisorUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Whether the supervisor should retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { transient: true, .. })
    }
}

fn join_capabilities(caps: &[Capability]) -> String {
    caps.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<localpush_api::Error> for CoreError {
    fn from(err: localpush_api::Error) -> Self {
        match err {
            localpush_api::Error::InvalidUrl(e) => CoreError::Configuration {
                message: format!("Invalid relay URL: {e}"),
            },
            localpush_api::Error::InvalidEndpoint(message) => CoreError::Configuration { message },
            localpush_api::Error::TlsConfig(reason) => CoreError::Configuration {
                message: format!("TLS setup failed: {reason}"),
            },
            other => CoreError::Transport {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_errors_become_configuration_errors() {
        let err: CoreError = localpush_api::Error::InvalidEndpoint("host is empty".into()).into();
        assert!(matches!(err, CoreError::Configuration { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn tls_setup_errors_become_configuration_errors() {
        let err: CoreError = localpush_api::Error::TlsConfig("no such file".into()).into();
        assert!(matches!(err, CoreError::Configuration { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn wire_errors_stay_retryable() {
        let err: CoreError = localpush_api::Error::HandshakeTimeout { timeout_ms: 20_000 }.into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("20000ms"));
    }

    #[test]
    fn permission_error_names_capabilities() {
        let err = CoreError::PermissionDenied {
            missing: vec![Capability::Location, Capability::Notifications],
        };
        assert_eq!(
            err.to_string(),
            "Missing permissions: location, notifications"
        );
    }
}
