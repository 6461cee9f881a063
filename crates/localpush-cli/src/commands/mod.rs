//! Command dispatch: bridges CLI args -> `LocalPush` calls -> output formatting.

pub mod listen;
pub mod permissions;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use localpush_config::SettingsFile;
use localpush_core::LocalPush;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;
use crate::platform::{TerminalNotifier, TerminalPermissions};

/// Dispatch a command that needs the runtime.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let push = open(global)?;
    let result = match cmd {
        Command::Init(args) => settings::init(&push, &args, global).await,
        Command::Config(args) => settings::config(&push, &args, global).await,
        Command::Register(args) => settings::register(&push, args, global).await,
        Command::DeviceId => settings::device_id(&push, global),
        Command::Show => settings::show(&push, global),
        Command::Permissions(args) => permissions::handle(&push, &args, global).await,
        Command::Listen(args) => listen::handle(&push, &args, global).await,
        // Handled before the runtime is opened
        Command::Completions(_) => Ok(()),
    };
    push.shutdown().await;
    result
}

/// Settings file selected by `--settings` or the platform default.
pub fn settings_file(global: &GlobalOpts) -> SettingsFile {
    global
        .settings
        .clone()
        .map_or_else(SettingsFile::default_location, SettingsFile::new)
}

fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(localpush_config::config_path)
}

/// Build the runtime over the selected settings file.
fn open(global: &GlobalOpts) -> Result<LocalPush, CliError> {
    let options = localpush_config::load_runtime_options(&config_path(global))?;
    let file = settings_file(global);
    tracing::debug!(settings = %file.path().display(), "opening settings");

    let push = LocalPush::builder(Arc::new(file))
        .options(options)
        .permissions(Arc::new(TerminalPermissions::new(global.yes)))
        .notifier(Arc::new(TerminalNotifier::new(output::should_color(
            global.color,
        ))))
        .build()?;
    Ok(push)
}
