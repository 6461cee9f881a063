//! `init`, `config`, `register`, `device-id` and `show`.

use serde::Serialize;
use tabled::Tabled;

use localpush_core::{
    AndroidSettings, Configuration, ConnectionType, IosSettings, LocalPush, PlatformSettings,
    SystemType, TcpMode, UserIdentity, WindowsSettings,
};

use crate::cli::{ConfigArgs, GlobalOpts, InitArgs, RegisterArgs, RelayArgs};
use crate::error::CliError;
use crate::output;

use super::settings_file;

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn init(push: &LocalPush, args: &InitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let system_type = args.platform.map_or_else(SystemType::current, SystemType::from);
    let host = args.relay.host.clone().ok_or_else(|| missing("host"))?;
    let port = args.relay.port.ok_or_else(|| missing("port"))?;
    let mode = relay_mode(&args.relay, host, port, ConnectionType::default());

    let platform = platform_settings(system_type, args);
    push.initialize(system_type, platform, mode).await?;
    print_settings(push, global);
    Ok(())
}

pub async fn config(
    push: &LocalPush,
    args: &ConfigArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let current = push.settings();
    if !current.is_configured() && (args.relay.host.is_none() || args.relay.port.is_none()) {
        return Err(not_configured(global));
    }

    let host = args
        .relay
        .host
        .clone()
        .or_else(|| current.host.clone())
        .ok_or_else(|| missing("host"))?;
    let port = args
        .relay
        .port
        .or(current.port)
        .ok_or_else(|| missing("port"))?;
    let mode = relay_mode(&args.relay, host, port, current.connection_type());
    let ssids = (!args.relay.ssids.is_empty()).then(|| args.relay.ssids.clone());

    push.config(mode, ssids).await?;
    print_settings(push, global);
    Ok(())
}

pub async fn register(
    push: &LocalPush,
    args: RegisterArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.connector_id.trim().is_empty() {
        return Err(CliError::Validation {
            field: "connector-id".into(),
            reason: "must not be empty".into(),
        });
    }
    push.register_user(UserIdentity {
        connector_id: args.connector_id,
        connector_tag: args.connector_tag,
    })
    .await?;
    print_settings(push, global);
    Ok(())
}

pub fn device_id(push: &LocalPush, global: &GlobalOpts) -> Result<(), CliError> {
    let id = push.device_id()?;
    output::print_output(&id, global.quiet);
    Ok(())
}

pub fn show(push: &LocalPush, global: &GlobalOpts) -> Result<(), CliError> {
    print_settings(push, global);
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

fn relay_mode(args: &RelayArgs, host: String, port: u16, fallback: ConnectionType) -> TcpMode {
    TcpMode {
        host,
        port,
        path: args.path.clone(),
        public_key: args.public_key.clone(),
        connection_type: args.transport.map_or(fallback, ConnectionType::from),
    }
}

fn platform_settings(system_type: SystemType, args: &InitArgs) -> PlatformSettings {
    let mut settings = PlatformSettings::default();
    match system_type {
        SystemType::Android => {
            settings.android = Some(AndroidSettings {
                icon: args.icon.clone().unwrap_or_else(|| "ic_notification".into()),
                channel_notification: args.channel.clone(),
            });
        }
        SystemType::Windows => {
            settings.windows = Some(WindowsSettings {
                bundle_id: args.bundle_id.clone().unwrap_or_else(|| "localpush".into()),
                display_name: args
                    .display_name
                    .clone()
                    .unwrap_or_else(|| "Local Push".into()),
                icon: args.icon.clone().unwrap_or_default(),
                icon_content: None,
            });
        }
        SystemType::Ios | SystemType::Macos | SystemType::Linux => {}
    }
    // The allow-list travels in the iOS block on every platform.
    if system_type == SystemType::Ios || !args.relay.ssids.is_empty() {
        settings.ios = Some(IosSettings {
            ssids: args.relay.ssids.clone(),
        });
    }
    settings
}

fn missing(field: &str) -> CliError {
    CliError::Validation {
        field: field.into(),
        reason: format!("--{field} is required"),
    }
}

pub fn not_configured(global: &GlobalOpts) -> CliError {
    CliError::NotConfigured {
        path: settings_file(global).path().display().to_string(),
    }
}

// ── Rendering ────────────────────────────────────────────────────────

/// Stored settings as shown to the user. The public key is never printed.
#[derive(Debug, Serialize)]
struct SettingsView {
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    connection_type: ConnectionType,
    public_key_set: bool,
    connector_id: Option<String>,
    connector_tag: Option<String>,
    device_id: Option<String>,
    system_type: Option<String>,
    ssid_allow_list: Vec<String>,
    generation: u64,
}

impl From<&Configuration> for SettingsView {
    fn from(c: &Configuration) -> Self {
        Self {
            host: c.host.clone(),
            port: c.port,
            path: c.path.clone(),
            connection_type: c.connection_type(),
            public_key_set: c.public_key.as_deref().is_some_and(|k| !k.is_empty()),
            connector_id: c.connector_id.clone(),
            connector_tag: c.connector_tag.clone(),
            device_id: c.device_id.clone(),
            system_type: c.system_type.map(|s| s.to_string()),
            ssid_allow_list: c.ssid_allow_list.clone(),
            generation: c.generation,
        }
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn or_dash(value: Option<&str>) -> String {
    value.map_or_else(|| "-".into(), ToOwned::to_owned)
}

fn detail(view: &SettingsView) -> String {
    let rows = [
        FieldRow {
            field: "host",
            value: or_dash(view.host.as_deref()),
        },
        FieldRow {
            field: "port",
            value: view.port.map_or_else(|| "-".into(), |p| p.to_string()),
        },
        FieldRow {
            field: "path",
            value: or_dash(view.path.as_deref()),
        },
        FieldRow {
            field: "transport",
            value: view.connection_type.to_string(),
        },
        FieldRow {
            field: "public key",
            value: if view.public_key_set { "set" } else { "-" }.into(),
        },
        FieldRow {
            field: "connector id",
            value: or_dash(view.connector_id.as_deref()),
        },
        FieldRow {
            field: "connector tag",
            value: or_dash(view.connector_tag.as_deref()),
        },
        FieldRow {
            field: "device id",
            value: or_dash(view.device_id.as_deref()),
        },
        FieldRow {
            field: "platform",
            value: or_dash(view.system_type.as_deref()),
        },
        FieldRow {
            field: "ssids",
            value: if view.ssid_allow_list.is_empty() {
                "-".into()
            } else {
                view.ssid_allow_list.join(", ")
            },
        },
        FieldRow {
            field: "generation",
            value: view.generation.to_string(),
        },
    ];
    output::render_table(&rows)
}

fn print_settings(push: &LocalPush, global: &GlobalOpts) {
    let view = SettingsView::from(push.settings().as_ref());
    let rendered = output::render_single(global.output, &view, detail, |v| {
        or_dash(v.host.as_deref())
    });
    output::print_output(&rendered, global.quiet);
}
