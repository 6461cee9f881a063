//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use localpush_config::ConfigError;
use localpush_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Relay is not configured")]
    #[diagnostic(
        code(localpush::not_configured),
        help(
            "Configure it with: localpush init --host <HOST> --port <PORT>\n\
             Settings file: {path}"
        )
    )]
    NotConfigured { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(localpush::validation))]
    Validation { field: String, reason: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(localpush::configuration))]
    Configuration { message: String },

    #[error(transparent)]
    #[diagnostic(
        code(localpush::config_file),
        help("Check the settings and config files, or remove them to start over.")
    )]
    ConfigFile(#[from] ConfigError),

    // ── Permissions ──────────────────────────────────────────────────
    #[error("Missing permissions: {missing}")]
    #[diagnostic(
        code(localpush::permission_denied),
        help("Grant them with: localpush permissions --request")
    )]
    PermissionDenied { missing: String },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Connection to the relay failed: {message}")]
    #[diagnostic(
        code(localpush::connection_failed),
        help("Check that the relay is running and reachable from this network.")
    )]
    ConnectionFailed { message: String },

    #[error("Settings storage failed: {message}")]
    #[diagnostic(code(localpush::persistence))]
    Persistence { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(localpush::internal))]
    Internal { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::Configuration { .. } | Self::NotConfigured { .. } => {
                exit_code::USAGE
            }
            Self::ConfigFile(_) | Self::Persistence { .. } => exit_code::CONFIG,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Internal { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration { message } => CliError::Configuration { message },

            CoreError::PermissionDenied { missing } => CliError::PermissionDenied {
                missing: missing
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            },

            CoreError::PermissionUnavailable { message } => CliError::PermissionDenied {
                missing: message,
            },

            e @ (CoreError::Transport { .. } | CoreError::RetriesExhausted { .. }) => {
                CliError::ConnectionFailed {
                    message: e.to_string(),
                }
            }

            CoreError::Persistence { message } => CliError::Persistence { message },

            e @ (CoreError::KeepAlive { .. }
            | CoreError::Notifier { .. }
            | CoreError::SupervisorUnavailable
            | CoreError::Internal(_)) => CliError::Internal {
                message: e.to_string(),
            },
        }
    }
}
