// ── Connection supervisor ──
//
// Owns at most one live session. Commands are applied one at a time by
// a background task; a session for a newer generation is only spawned
// after the previous one has fully shut down, so two sessions never
// overlap.

mod keepalive;
mod session;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use localpush_api::wire::RegisterFrame;
use localpush_api::{Connector, TlsMode};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use keepalive::{KeepAlive, KeepAliveGuard, ProcessKeepAlive};

use self::session::{Session, SessionEnd};
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::error::CoreError;
use crate::events::PlatformHooks;
use crate::reconnect::ReconnectPolicy;
use crate::settings::Configuration;

const COMMAND_CHANNEL_SIZE: usize = 16;

// ── SessionState ─────────────────────────────────────────────────────

/// Lifecycle of the supervised session, observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Starting,
    Connected,
    Reconnecting { attempt: u32, retry_in_ms: u64 },
    Stopping,
    Stopped,
    /// Retries exhausted or a permanent error. Needs a new `start`.
    Failed { reason: String },
}

impl SessionState {
    /// Starting, connected, or between retries.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Connected | Self::Reconnecting { .. }
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Starting => f.write_str("starting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt, .. } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Settings generation the session runs with.
    pub generation: Option<u64>,
    #[serde(flatten)]
    pub state: SessionState,
    pub since: DateTime<Utc>,
}

impl SessionStatus {
    pub fn new(generation: Option<u64>, state: SessionState) -> Self {
        Self {
            generation,
            state,
            since: Utc::now(),
        }
    }
}

// ── Options ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub ping_interval: Duration,
    /// Silence longer than this drops the link.
    pub pong_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub tls: TlsMode,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(45),
            reconnect: ReconnectPolicy::default(),
            tls: TlsMode::System,
        }
    }
}

// ── ConnectionSupervisor ─────────────────────────────────────────────

/// Handle to the supervisor task. Cheaply cloneable.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    command_tx: mpsc::Sender<CommandEnvelope>,
    status: Arc<watch::Sender<SessionStatus>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor task. Nothing connects until [`start`](Self::start).
    pub fn spawn(
        connector: Arc<dyn Connector>,
        keep_alive: Arc<dyn KeepAlive>,
        hooks: PlatformHooks,
        options: SupervisorOptions,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let status = Arc::new(watch::channel(SessionStatus::new(None, SessionState::Idle)).0);
        let cancel = CancellationToken::new();

        let core = SupervisorCore {
            connector,
            keep_alive,
            hooks,
            options,
            status: Arc::clone(&status),
            cancel: cancel.clone(),
            active: None,
            permit: None,
            next_session: 0,
            ended_tx,
        };
        let task = tokio::spawn(command_processor_task(
            core,
            command_rx,
            ended_rx,
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(SupervisorInner {
                command_tx,
                status,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Run a session for `config`, superseding any older one.
    pub async fn start(&self, config: Arc<Configuration>) -> Result<CommandResult, CoreError> {
        self.execute(Command::Start(config)).await
    }

    /// Hand new settings to the live session, if there is one.
    ///
    /// Decided inside the command stream: a `stop` queued ahead of this
    /// wins and nothing is restarted.
    pub async fn reconfigure(
        &self,
        config: Arc<Configuration>,
    ) -> Result<CommandResult, CoreError> {
        self.execute(Command::Reconfigure(config)).await
    }

    /// Stop the session. Idempotent.
    pub async fn stop(&self) -> Result<CommandResult, CoreError> {
        self.execute(Command::Stop).await
    }

    /// Send a command to the supervisor task and await the result.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::SupervisorUnavailable)?;

        rx.await.map_err(|_| CoreError::SupervisorUnavailable)?
    }

    /// Subscribe to session state changes.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn current_status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// Stop any session and end the supervisor task.
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop().await {
            debug!(error = %e, "stop during shutdown failed");
        }
        self.inner.cancel.cancel();
        if let Some(task) = self.inner.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "supervisor task ended abnormally");
            }
        }
    }
}

// ── Supervisor task ──────────────────────────────────────────────────

struct ActiveSession {
    id: u64,
    config: Arc<Configuration>,
    identity_tx: watch::Sender<Option<RegisterFrame>>,
    cancel: CancellationToken,
    handle: JoinHandle<SessionEnd>,
}

struct SupervisorCore {
    connector: Arc<dyn Connector>,
    keep_alive: Arc<dyn KeepAlive>,
    hooks: PlatformHooks,
    options: SupervisorOptions,
    status: Arc<watch::Sender<SessionStatus>>,
    cancel: CancellationToken,
    active: Option<ActiveSession>,
    permit: Option<KeepAliveGuard>,
    next_session: u64,
    ended_tx: mpsc::UnboundedSender<u64>,
}

/// Apply commands one at a time until cancelled.
async fn command_processor_task(
    mut core: SupervisorCore,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    mut ended_rx: mpsc::UnboundedReceiver<u64>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(session_id) = ended_rx.recv() => core.on_session_ended(session_id).await,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = core.apply(envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }

    core.teardown_active().await;
    core.release_keep_alive();
    debug!("supervisor stopped");
}

impl SupervisorCore {
    async fn apply(&mut self, command: Command) -> Result<CommandResult, CoreError> {
        match command {
            Command::Start(config) => self.start(config).await,
            Command::Reconfigure(config) => self.reconfigure(config).await,
            Command::Stop => Ok(self.stop().await),
        }
    }

    async fn start(&mut self, config: Arc<Configuration>) -> Result<CommandResult, CoreError> {
        let target = config.relay_target(&self.options.tls)?;

        if let Some(active) = self.active.as_mut() {
            if !active.handle.is_finished() {
                if config.generation < active.config.generation {
                    debug!(
                        requested = config.generation,
                        running = active.config.generation,
                        "ignoring start for an older generation"
                    );
                    return Ok(CommandResult::Unchanged);
                }

                if active.config.same_endpoint(&config) {
                    let frame = config.register_frame();
                    let identity_changed = *active.identity_tx.borrow() != frame;
                    if identity_changed {
                        active.identity_tx.send_replace(frame);
                    }
                    let unchanged =
                        !identity_changed && config.generation == active.config.generation;
                    active.config = Arc::clone(&config);
                    self.status
                        .send_modify(|s| s.generation = Some(config.generation));

                    if unchanged {
                        return Ok(CommandResult::Unchanged);
                    }
                    info!(
                        generation = config.generation,
                        identity_changed, "session kept for unchanged endpoint"
                    );
                    return Ok(CommandResult::Reconfigured {
                        generation: config.generation,
                    });
                }
            }
        }

        if self.active.is_some() {
            info!(generation = config.generation, "superseding running session");
        }
        self.teardown_active().await;

        if self.permit.is_none() {
            self.permit = Some(self.keep_alive.acquire()?);
        }

        let id = self.next_session;
        self.next_session = self.next_session.wrapping_add(1);
        let (identity_tx, identity_rx) = watch::channel(config.register_frame());
        let cancel = self.cancel.child_token();

        let session = Session {
            generation: config.generation,
            target,
            connector: Arc::clone(&self.connector),
            identity: identity_rx,
            hooks: self.hooks.clone(),
            status: Arc::clone(&self.status),
            options: self.options.clone(),
            cancel: cancel.clone(),
        };
        self.status.send_replace(SessionStatus::new(
            Some(config.generation),
            SessionState::Starting,
        ));
        let ended_tx = self.ended_tx.clone();
        let handle = tokio::spawn(async move {
            let end = session.run().await;
            let _ = ended_tx.send(id);
            end
        });

        info!(generation = config.generation, "session started");
        self.active = Some(ActiveSession {
            id,
            config: Arc::clone(&config),
            identity_tx,
            cancel,
            handle,
        });
        Ok(CommandResult::Started {
            generation: config.generation,
        })
    }

    async fn reconfigure(
        &mut self,
        config: Arc<Configuration>,
    ) -> Result<CommandResult, CoreError> {
        let live = self
            .active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished());
        if !live {
            debug!(
                generation = config.generation,
                "no live session, settings apply on next start"
            );
            return Ok(CommandResult::Unchanged);
        }
        self.start(config).await
    }

    async fn stop(&mut self) -> CommandResult {
        if self.active.is_none() && self.permit.is_none() {
            debug!("stop requested with no session running");
            return CommandResult::AlreadyStopped;
        }

        let generation = self.active.as_ref().map(|a| a.config.generation);
        self.status
            .send_replace(SessionStatus::new(generation, SessionState::Stopping));
        self.teardown_active().await;
        self.release_keep_alive();
        self.status
            .send_replace(SessionStatus::new(generation, SessionState::Stopped));
        info!("session stopped");
        CommandResult::Stopped
    }

    /// A session task returned on its own (permanent failure or retries
    /// exhausted).
    async fn on_session_ended(&mut self, session_id: u64) {
        if self.active.as_ref().map(|a| a.id) != Some(session_id) {
            return;
        }
        if let Some(active) = self.active.take() {
            match active.handle.await {
                Ok(SessionEnd::Failed(e)) => warn!(error = %e, "session ended"),
                Ok(SessionEnd::Cancelled) => debug!("session cancelled"),
                Err(e) => warn!(error = %e, "session task panicked"),
            }
        }
        self.release_keep_alive();
    }

    async fn teardown_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        match active.handle.await {
            Ok(end) => debug!(generation = active.config.generation, ?end, "session torn down"),
            Err(e) => warn!(error = %e, "session task panicked"),
        }
    }

    fn release_keep_alive(&mut self) {
        if self.permit.take().is_some() {
            debug!("keep-alive permit released");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
