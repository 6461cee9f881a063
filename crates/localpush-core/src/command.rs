// ── Supervisor commands ──
//
// Every lifecycle change flows through one channel and is applied by a
// single task, so start/stop/reconfigure never interleave.

use std::sync::Arc;

use crate::error::CoreError;
use crate::settings::Configuration;

/// A command envelope sent through the command channel.
/// Contains the command and a oneshot response channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

#[derive(Debug, Clone)]
pub enum Command {
    /// Run a session for this configuration, superseding older ones.
    Start(Arc<Configuration>),
    /// Apply new settings to the live session. No-op when nothing runs.
    Reconfigure(Arc<Configuration>),
    /// Tear down the current session, if any.
    Stop,
}

/// What a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    /// A new session was started.
    Started { generation: u64 },
    /// The live session was kept; only its identity was refreshed.
    Reconfigured { generation: u64 },
    /// Nothing to do (same or older generation, or no live session).
    Unchanged,
    Stopped,
    /// `stop()` with nothing running.
    AlreadyStopped,
}
