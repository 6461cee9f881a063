// ── Runtime tuning ──
//
// These types describe *how* sessions behave: handshake bound, heartbeat,
// backoff, router limits and TLS verification. They never touch disk;
// localpush-config loads them and hands them in.

use std::path::PathBuf;
use std::time::Duration;

use localpush_api::TlsMode;
use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectPolicy;
use crate::router::RouterOptions;
use crate::supervisor::SupervisorOptions;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsVerification {
    /// Bundled web PKI roots (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed relays on a LAN).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Tunables for the connection runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Bound on TCP + TLS + upgrade, in seconds.
    pub handshake_timeout_secs: u64,
    pub ping_interval_secs: u64,
    /// Silence after which the link is considered dead, in seconds.
    pub pong_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
    pub router: RouterOptions,
    pub tls: TlsVerification,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 20,
            ping_interval_secs: 15,
            pong_timeout_secs: 45,
            reconnect: ReconnectPolicy::default(),
            router: RouterOptions::default(),
            tls: TlsVerification::default(),
        }
    }
}

impl RuntimeOptions {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs.max(1))
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        let ping_interval = Duration::from_secs(self.ping_interval_secs.max(1));
        SupervisorOptions {
            ping_interval,
            pong_timeout: Duration::from_secs(self.pong_timeout_secs).max(ping_interval),
            reconnect: self.reconnect.clone(),
            tls: TlsMode::from(&self.tls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = RuntimeOptions::default().supervisor_options();
        assert_eq!(opts.ping_interval, Duration::from_secs(15));
        assert_eq!(opts.pong_timeout, Duration::from_secs(45));
        assert_eq!(opts.tls, TlsMode::System);
        assert_eq!(
            RuntimeOptions::default().handshake_timeout(),
            Duration::from_secs(20)
        );
    }

    #[test]
    fn pong_timeout_never_below_ping_interval() {
        let opts = RuntimeOptions {
            ping_interval_secs: 30,
            pong_timeout_secs: 5,
            ..RuntimeOptions::default()
        };
        assert_eq!(
            opts.supervisor_options().pong_timeout,
            Duration::from_secs(30)
        );
    }
}
