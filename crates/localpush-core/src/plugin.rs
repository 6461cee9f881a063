// ── Application facade ──
//
// The surface a host application talks to. Every call persists first
// and only then hands work to the supervisor, so a call returning `Ok`
// means the change is durable, not that the relay is reachable.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use localpush_api::{Connector, NetworkConnector};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RuntimeOptions;
use crate::error::CoreError;
use crate::events::{PlatformHooks, spawn_event_pump};
use crate::permission::{AlwaysGranted, PermissionGate, PermissionPlatform, PermissionState};
use crate::router::{AppAttachment, MessageRouter, SystemNotifier, TracingNotifier};
use crate::settings::{Configuration, ConnectionType, FieldUpdate, SettingsPatch, SystemType};
use crate::store::{SettingsBackend, SettingsStore};
use crate::stream::SnapshotStream;
use crate::supervisor::{ConnectionSupervisor, KeepAlive, ProcessKeepAlive, SessionStatus};

// ── Boundary types ───────────────────────────────────────────────────

/// Relay target as the application describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpMode {
    pub host: String,
    pub port: u16,
    /// WebSocket path. `None` keeps the stored path.
    pub path: Option<String>,
    /// Relay key. `None` keeps the stored key.
    pub public_key: Option<String>,
    pub connection_type: ConnectionType,
}

impl TcpMode {
    fn validate(&self) -> Result<(), CoreError> {
        if self.host.trim().is_empty() {
            return Err(CoreError::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(CoreError::config("port must be non-zero"));
        }
        Ok(())
    }

    fn patch(&self) -> SettingsPatch {
        SettingsPatch {
            host: FieldUpdate::Set(self.host.trim().to_owned()),
            port: FieldUpdate::Set(self.port),
            path: self.path.clone().into(),
            public_key: self.public_key.clone().into(),
            connection_type: Some(self.connection_type),
            ..SettingsPatch::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidSettings {
    pub icon: String,
    pub channel_notification: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IosSettings {
    /// Wi-Fi networks the connection is allowed on.
    pub ssids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowsSettings {
    pub bundle_id: String,
    pub display_name: String,
    pub icon: String,
    pub icon_content: Option<String>,
}

/// Per-platform presentation settings passed to `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub android: Option<AndroidSettings>,
    pub ios: Option<IosSettings>,
    pub windows: Option<WindowsSettings>,
}

impl PlatformSettings {
    /// The block `system_type` depends on must be present.
    pub fn require(&self, system_type: SystemType) -> Result<(), CoreError> {
        let present = match system_type {
            SystemType::Android => self.android.is_some(),
            SystemType::Ios => self.ios.is_some(),
            SystemType::Windows => self.windows.is_some(),
            SystemType::Macos | SystemType::Linux => true,
        };
        if present {
            Ok(())
        } else {
            Err(CoreError::config(format!(
                "{system_type} settings are required"
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub connector_id: String,
    pub connector_tag: String,
}

// ── Builder ──────────────────────────────────────────────────────────

/// Wires a [`LocalPush`] from its platform seams. Every seam has a
/// desktop default.
pub struct LocalPushBuilder {
    backend: Arc<dyn SettingsBackend>,
    connector: Option<Arc<dyn Connector>>,
    permissions: Arc<dyn PermissionPlatform>,
    notifier: Arc<dyn SystemNotifier>,
    keep_alive: Arc<dyn KeepAlive>,
    options: RuntimeOptions,
    platform_device_id: Option<String>,
}

impl LocalPushBuilder {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self {
            backend,
            connector: None,
            permissions: Arc::new(AlwaysGranted),
            notifier: Arc::new(TracingNotifier),
            keep_alive: Arc::new(ProcessKeepAlive),
            options: RuntimeOptions::default(),
            platform_device_id: None,
        }
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn permissions(mut self, platform: Arc<dyn PermissionPlatform>) -> Self {
        self.permissions = platform;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn SystemNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Arc<dyn KeepAlive>) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Device id supplied by the OS, used instead of a generated one.
    pub fn platform_device_id(mut self, id: impl Into<String>) -> Self {
        self.platform_device_id = Some(id.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Load settings and spawn the background tasks. Must be called
    /// inside a Tokio runtime.
    pub fn build(self) -> Result<LocalPush, CoreError> {
        let store = Arc::new(SettingsStore::open(self.backend)?);
        let system_type = store
            .current()
            .system_type
            .unwrap_or_else(SystemType::current);

        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(NetworkConnector::new(self.options.handshake_timeout()))
        });
        let router = MessageRouter::new(&self.options.router, self.notifier);
        let (hooks, events) = PlatformHooks::channel();
        let cancel = CancellationToken::new();
        let pump = spawn_event_pump(events, router.clone(), cancel.clone());
        let supervisor = ConnectionSupervisor::spawn(
            connector,
            self.keep_alive,
            hooks.clone(),
            self.options.supervisor_options(),
        );

        Ok(LocalPush {
            store,
            supervisor,
            router,
            hooks,
            permissions: PermissionGate::new(self.permissions, system_type),
            platform: ArcSwapOption::empty(),
            platform_device_id: self.platform_device_id,
            cancel,
            pump: Mutex::new(Some(pump)),
        })
    }
}

// ── LocalPush ────────────────────────────────────────────────────────

pub struct LocalPush {
    store: Arc<SettingsStore>,
    supervisor: ConnectionSupervisor,
    router: MessageRouter,
    hooks: PlatformHooks,
    permissions: PermissionGate,
    platform: ArcSwapOption<PlatformSettings>,
    platform_device_id: Option<String>,
    cancel: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl LocalPush {
    pub fn builder(backend: Arc<dyn SettingsBackend>) -> LocalPushBuilder {
        LocalPushBuilder::new(backend)
    }

    // ── Configuration ────────────────────────────────────────────

    /// Declare the platform and relay target. Persists; does not start.
    pub async fn initialize(
        &self,
        system_type: SystemType,
        platform: PlatformSettings,
        mode: TcpMode,
    ) -> Result<bool, CoreError> {
        platform.require(system_type)?;
        mode.validate()?;

        let mut patch = mode.patch();
        patch.system_type = Some(system_type);
        if let Some(ios) = &platform.ios {
            patch.ssid_allow_list = FieldUpdate::Set(ios.ssids.clone());
        }
        if let Some(id) = self.missing_device_id() {
            patch.device_id = FieldUpdate::Set(id);
        }

        let config = self.store.update(&patch)?;
        self.permissions.set_system_type(system_type);
        self.platform.store(Some(Arc::new(platform)));
        info!(
            %system_type,
            generation = config.generation,
            host = config.host.as_deref().unwrap_or_default(),
            "initialized"
        );

        self.reconfigure_running(config).await?;
        Ok(true)
    }

    /// Change the relay target. A running session is reconfigured.
    pub async fn config(
        &self,
        mode: TcpMode,
        ssid_allow_list: Option<Vec<String>>,
    ) -> Result<bool, CoreError> {
        mode.validate()?;
        let mut patch = mode.patch();
        patch.ssid_allow_list = ssid_allow_list.into();

        let config = self.store.update(&patch)?;
        debug!(generation = config.generation, "relay target updated");
        self.reconfigure_running(config).await?;
        Ok(true)
    }

    /// Replace the user identity. A running session re-registers on
    /// its live link.
    pub async fn register_user(&self, user: UserIdentity) -> Result<bool, CoreError> {
        let config = self.store.update(&SettingsPatch::identity(
            user.connector_id,
            user.connector_tag,
        ))?;
        debug!(generation = config.generation, "user identity updated");
        self.reconfigure_running(config).await?;
        Ok(true)
    }

    /// Stable device id, generated and persisted on first use.
    pub fn device_id(&self) -> Result<String, CoreError> {
        if let Some(id) = self.store.current().device_id.clone().filter(|s| !s.is_empty()) {
            return Ok(id);
        }
        let id = self
            .missing_device_id()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let config = self.store.update(&SettingsPatch {
            device_id: FieldUpdate::Set(id),
            ..SettingsPatch::default()
        })?;
        config
            .device_id
            .clone()
            .ok_or_else(|| CoreError::Internal("device id missing after update".into()))
    }

    fn missing_device_id(&self) -> Option<String> {
        let current = self.store.current();
        if current.device_id.as_deref().is_some_and(|s| !s.is_empty()) {
            return None;
        }
        Some(
            self.platform_device_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        )
    }

    async fn reconfigure_running(&self, config: Arc<Configuration>) -> Result<(), CoreError> {
        let result = self.supervisor.reconfigure(config).await?;
        debug!(?result, "reconfigure applied");
        Ok(())
    }

    // ── Permissions ──────────────────────────────────────────────

    pub async fn request_permission(&self) -> Result<bool, CoreError> {
        self.permissions.request().await
    }

    pub fn check_permissions(&self) -> PermissionState {
        self.permissions.check()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start (or keep) the session for the persisted settings.
    pub async fn start(&self) -> Result<bool, CoreError> {
        let config = self.store.current();
        if !config.is_configured() {
            return Err(CoreError::config(
                "relay is not configured; call initialize first",
            ));
        }
        self.permissions.ensure_granted()?;

        let result = self.supervisor.start(config).await?;
        debug!(?result, "start applied");
        Ok(true)
    }

    /// Stop the session. Idempotent.
    pub async fn stop(&self) -> Result<bool, CoreError> {
        let result = self.supervisor.stop().await?;
        debug!(?result, "stop applied");
        Ok(true)
    }

    /// Stop everything and end the background tasks.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        self.cancel.cancel();
        if let Some(pump) = self.pump.lock().await.take() {
            let _ = pump.await;
        }
    }

    // ── Observation ──────────────────────────────────────────────

    /// Attach the application's message listener.
    pub fn attach(&self) -> AppAttachment {
        self.router.attach()
    }

    /// Handle for OS callbacks.
    pub fn hooks(&self) -> PlatformHooks {
        self.hooks.clone()
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.supervisor.status()
    }

    pub fn current_status(&self) -> SessionStatus {
        self.supervisor.current_status()
    }

    pub fn status_stream(&self) -> SnapshotStream<SessionStatus> {
        SnapshotStream::new(self.supervisor.status())
    }

    pub fn settings_stream(&self) -> SnapshotStream<Arc<Configuration>> {
        SnapshotStream::new(self.store.subscribe())
    }

    pub fn settings(&self) -> Arc<Configuration> {
        self.store.current()
    }

    /// Pick up settings written by another process.
    pub fn reload_settings(&self) -> Result<Arc<Configuration>, CoreError> {
        self.store.reload()
    }

    pub fn platform_settings(&self) -> Option<Arc<PlatformSettings>> {
        self.platform.load_full()
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }
}

// ── Tests ────────────────────────────────────────────────────────────
