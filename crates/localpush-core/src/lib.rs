// localpush-core: Connection runtime between localpush-api and the host application.

pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod permission;
pub mod plugin;
pub mod reconnect;
pub mod router;
pub mod settings;
pub mod store;
pub mod stream;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, CommandResult};
pub use config::{RuntimeOptions, TlsVerification};
pub use error::CoreError;
pub use events::{PlatformEvent, PlatformHooks};
pub use permission::{
    AlwaysGranted, Capability, Grant, PermissionGate, PermissionPlatform, PermissionState,
};
pub use plugin::{
    AndroidSettings, IosSettings, LocalPush, LocalPushBuilder, PlatformSettings, TcpMode,
    UserIdentity, WindowsSettings,
};
pub use reconnect::ReconnectPolicy;
pub use router::{AppAttachment, Delivery, MessageRouter, RouterOptions, SystemNotifier};
pub use settings::{Configuration, ConnectionType, FieldUpdate, SettingsPatch, SystemType};
pub use store::{MemoryBackend, SettingsBackend, SettingsStore};
pub use stream::SnapshotStream;
pub use supervisor::{
    ConnectionSupervisor, KeepAlive, KeepAliveGuard, ProcessKeepAlive, SessionState,
    SessionStatus, SupervisorOptions,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AppLifecycle, InboundMessage, MessageResponse, MessageSource, MessageSystem,
    NotificationContent,
};
