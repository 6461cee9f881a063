//! Clap derive structures for the `localpush` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use localpush_core::{AppLifecycle, ConnectionType, SystemType};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// localpush -- keep a push connection to a relay on your local network
#[derive(Debug, Parser)]
#[command(
    name = "localpush",
    version,
    about = "Receive push messages from a relay on your local network",
    long_about = "Configures and runs a local push connection.\n\n\
        Settings are stored in settings.toml and shared with any other host\n\
        on this machine; runtime tuning is read from config.toml.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, env = "LOCALPUSH_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    /// Runtime tuning file
    #[arg(long, env = "LOCALPUSH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LOCALPUSH_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Answer yes to permission prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Platform {
    Android,
    Ios,
    Windows,
    Macos,
    Linux,
}

impl From<Platform> for SystemType {
    fn from(p: Platform) -> Self {
        match p {
            Platform::Android => Self::Android,
            Platform::Ios => Self::Ios,
            Platform::Windows => Self::Windows,
            Platform::Macos => Self::Macos,
            Platform::Linux => Self::Linux,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Transport {
    /// Plain WebSocket
    Ws,
    /// WebSocket over TLS
    Wss,
    /// Line-delimited JSON over TCP+TLS
    TcpTls,
}

impl From<Transport> for ConnectionType {
    fn from(t: Transport) -> Self {
        match t {
            Transport::Ws => Self::Ws,
            Transport::Wss => Self::Wss,
            Transport::TcpTls => Self::TcpTls,
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Declare the platform and relay target
    Init(InitArgs),

    /// Change the relay target
    Config(ConfigArgs),

    /// Set the user identity sent to the relay
    Register(RegisterArgs),

    /// Print the stable device id
    DeviceId,

    /// Show or request OS permissions
    Permissions(PermissionsArgs),

    /// Connect and print messages until interrupted
    Listen(ListenArgs),

    /// Show stored settings
    Show,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Relay target flags shared by `init` and `config`.
#[derive(Debug, Args)]
pub struct RelayArgs {
    /// Relay host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// Relay port
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// WebSocket path (e.g. /ws)
    #[arg(long)]
    pub path: Option<String>,

    /// Relay public key
    #[arg(long, env = "LOCALPUSH_PUBLIC_KEY", hide_env_values = true)]
    pub public_key: Option<String>,

    /// Transport
    #[arg(long, short = 't')]
    pub transport: Option<Transport>,

    /// Wi-Fi networks the connection is allowed on (repeatable)
    #[arg(long = "ssid")]
    pub ssids: Vec<String>,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Host platform (defaults to the one this binary runs on)
    #[arg(long)]
    pub platform: Option<Platform>,

    #[command(flatten)]
    pub relay: RelayArgs,

    /// Notification icon (Android, Windows)
    #[arg(long)]
    pub icon: Option<String>,

    /// Notification channel name (Android)
    #[arg(long)]
    pub channel: Option<String>,

    /// Application id (Windows)
    #[arg(long)]
    pub bundle_id: Option<String>,

    /// Application display name (Windows)
    #[arg(long)]
    pub display_name: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub relay: RelayArgs,
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    /// User id on the relay
    #[arg(long)]
    pub connector_id: String,

    /// User tag on the relay
    #[arg(long)]
    pub connector_tag: String,
}

#[derive(Debug, Args)]
pub struct PermissionsArgs {
    /// Prompt for anything not yet granted
    #[arg(long)]
    pub request: bool,
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Exit after this many messages
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Treat the terminal as a backgrounded app (messages also raise
    /// a system notification)
    #[arg(long)]
    pub background: bool,
}

impl ListenArgs {
    pub fn lifecycle(&self) -> AppLifecycle {
        if self.background {
            AppLifecycle::Background
        } else {
            AppLifecycle::Foreground
        }
    }
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
