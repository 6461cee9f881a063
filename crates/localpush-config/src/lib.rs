//! Settings file and runtime tuning for local push connectivity.
//!
//! Two files live in the platform config directory:
//! `settings.toml` holds the durable settings record under the
//! `local_push_connectivity` table, and `config.toml` holds
//! [`RuntimeOptions`]. The CLI and any other host share both.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use localpush_core::{Configuration, CoreError, RuntimeOptions, SettingsBackend};
use thiserror::Error;
use tracing::{debug, warn};

/// Table the settings record lives under.
pub const SETTINGS_NAMESPACE: &str = "local_push_connectivity";

/// Prefix for environment overrides of [`RuntimeOptions`].
pub const ENV_PREFIX: &str = "LOCALPUSH_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::Persistence {
            message: err.to_string(),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ── Paths ───────────────────────────────────────────────────────────

/// Platform config directory (XDG on Linux).
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("com", "localpush", "localpush").map_or_else(
        dirs_fallback,
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("localpush");
    p
}

/// Runtime tuning file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Durable settings record file.
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

// ── Runtime options ─────────────────────────────────────────────────

/// Load [`RuntimeOptions`]: defaults, then the TOML file, then
/// `LOCALPUSH_*` variables (nested keys split on `__`, e.g.
/// `LOCALPUSH_RECONNECT__MAX_DELAY=60000`).
pub fn load_runtime_options(path: &Path) -> Result<RuntimeOptions, ConfigError> {
    let options: RuntimeOptions = Figment::new()
        .merge(Serialized::defaults(RuntimeOptions::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    validate_runtime_options(&options)?;
    Ok(options)
}

/// Load from the default path, falling back to defaults on any error.
pub fn load_runtime_options_or_default() -> RuntimeOptions {
    let path = config_path();
    load_runtime_options(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "using default runtime options");
        RuntimeOptions::default()
    })
}

fn validate_runtime_options(options: &RuntimeOptions) -> Result<(), ConfigError> {
    let reconnect = &options.reconnect;
    if reconnect.max_delay < reconnect.initial_delay {
        return Err(ConfigError::Validation {
            field: "reconnect.max_delay".into(),
            reason: "must not be below reconnect.initial_delay".into(),
        });
    }
    if !(0.0..=1.0).contains(&reconnect.jitter) {
        return Err(ConfigError::Validation {
            field: "reconnect.jitter".into(),
            reason: format!("expected a fraction in 0..=1, got {}", reconnect.jitter),
        });
    }
    if options.router.queue_depth == 0 {
        return Err(ConfigError::Validation {
            field: "router.queue_depth".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}

/// Serialize options to TOML at `path`.
pub fn save_runtime_options(options: &RuntimeOptions, path: &Path) -> Result<(), ConfigError> {
    let toml_str = toml::to_string_pretty(options)?;
    write_atomic(path, &toml_str)
}

// ── Settings file ───────────────────────────────────────────────────

/// [`SettingsBackend`] over a TOML file.
///
/// Only the `local_push_connectivity` table is owned; other tables in
/// the file are preserved on write.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File at [`settings_path`].
    pub fn default_location() -> Self {
        Self::new(settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<toml::Table>, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&self.path)(e)),
        };
        text.parse::<toml::Table>()
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source: Box::new(source),
            })
    }

    pub fn read(&self) -> Result<Option<Configuration>, ConfigError> {
        let Some(mut document) = self.read_document()? else {
            return Ok(None);
        };
        let Some(record) = document.remove(SETTINGS_NAMESPACE) else {
            return Ok(None);
        };
        record
            .try_into::<Configuration>()
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source: Box::new(source),
            })
    }

    pub fn write(&self, config: &Configuration) -> Result<(), ConfigError> {
        let mut document = self.read_document()?.unwrap_or_default();
        document.insert(
            SETTINGS_NAMESPACE.to_owned(),
            toml::Value::try_from(config)?,
        );
        write_atomic(&self.path, &toml::to_string_pretty(&document)?)?;
        debug!(
            path = %self.path.display(),
            generation = config.generation,
            "settings written"
        );
        Ok(())
    }
}

impl SettingsBackend for SettingsFile {
    fn load(&self) -> Result<Option<Configuration>, CoreError> {
        Ok(self.read()?)
    }

    fn persist(&self, config: &Configuration) -> Result<(), CoreError> {
        Ok(self.write(config)?)
    }
}

/// Write through a sibling temp file and rename, so readers in other
/// processes see either the old or the new file.
fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use std::sync::Arc;

    use figment::Jail;
    use localpush_core::{ConnectionType, FieldUpdate, SettingsPatch, SettingsStore, SystemType};
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> Configuration {
        Configuration::default().merge(&SettingsPatch {
            host: FieldUpdate::Set("relay.example.com".into()),
            port: FieldUpdate::Set(443),
            path: FieldUpdate::Set("/ws".into()),
            connection_type: Some(ConnectionType::Wss),
            system_type: Some(SystemType::Ios),
            ssid_allow_list: FieldUpdate::Set(vec!["home".into()]),
            ..SettingsPatch::default()
        })
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("settings.toml"));
        assert!(file.read().unwrap().is_none());
    }

    #[test]
    fn record_survives_a_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let file = SettingsFile::new(dir.path().join("nested/settings.toml"));
        file.write(&sample()).unwrap();

        let loaded = file.read().unwrap().unwrap();
        assert_eq!(loaded, sample());
        let text = fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("[local_push_connectivity]"));
        assert!(text.contains("system_type = 1"));
    }

    #[test]
    fn foreign_tables_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[other_plugin]\nkey = \"value\"\n").unwrap();

        let file = SettingsFile::new(&path);
        file.write(&sample()).unwrap();

        let document: toml::Table = fs::read_to_string(&path).unwrap().parse().unwrap();
        let other = document.get("other_plugin").and_then(|t| t.get("key"));
        assert_eq!(other.and_then(toml::Value::as_str), Some("value"));
        assert!(document.contains_key(SETTINGS_NAMESPACE));
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "not = [valid").unwrap();
        let err = SettingsFile::new(&path).read().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn store_over_file_is_shared_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let writer = SettingsStore::open(Arc::new(SettingsFile::new(&path))).unwrap();
        writer
            .update(&SettingsPatch::identity("u-1", "alice"))
            .unwrap();

        // A second process opening the same file sees the record.
        let reader = SettingsStore::open(Arc::new(SettingsFile::new(&path))).unwrap();
        assert_eq!(reader.current().connector_id.as_deref(), Some("u-1"));
        assert_eq!(reader.current().generation, writer.current().generation);
    }

    #[test]
    fn stores_sharing_a_file_keep_each_others_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        // Both open before either writes, like an app and its background service.
        let app = SettingsStore::open(Arc::new(SettingsFile::new(&path))).unwrap();
        let service = SettingsStore::open(Arc::new(SettingsFile::new(&path))).unwrap();

        app.update(&SettingsPatch::identity("u-1", "alice")).unwrap();
        service
            .update(&SettingsPatch {
                host: FieldUpdate::Set("relay.example.com".into()),
                ..SettingsPatch::default()
            })
            .unwrap();

        let on_disk = SettingsFile::new(&path).read().unwrap().unwrap();
        assert_eq!(on_disk.connector_id.as_deref(), Some("u-1"));
        assert_eq!(on_disk.connector_tag.as_deref(), Some("alice"));
        assert_eq!(on_disk.host.as_deref(), Some("relay.example.com"));
        assert_eq!(on_disk.generation, 2);

        // The app's next write builds on the service's record in turn.
        let next = app
            .update(&SettingsPatch {
                port: FieldUpdate::Set(443),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert_eq!(next.generation, 3);
        assert_eq!(next.host.as_deref(), Some("relay.example.com"));
    }

    #[test]
    fn runtime_options_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r"
                    ping_interval_secs = 20

                    [reconnect]
                    max_delay = 60000
                    max_retries = 8
                ",
            )?;
            jail.set_env("LOCALPUSH_PONG_TIMEOUT_SECS", "90");
            jail.set_env("LOCALPUSH_ROUTER__QUEUE_DEPTH", "16");

            let options =
                load_runtime_options(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(options.ping_interval_secs, 20);
            assert_eq!(options.pong_timeout_secs, 90);
            assert_eq!(options.reconnect.max_delay, Duration::from_secs(60));
            assert_eq!(options.reconnect.max_retries, Some(8));
            assert_eq!(options.reconnect.initial_delay, Duration::from_secs(1));
            assert_eq!(options.router.queue_depth, 16);
            assert_eq!(options.handshake_timeout_secs, 20);
            Ok(())
        });
    }

    #[test]
    fn runtime_options_reject_inverted_backoff() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[reconnect]\ninitial_delay = 5000\nmax_delay = 1000\n",
            )?;
            let err = load_runtime_options(Path::new("config.toml")).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Validation { ref field, .. } if field == "reconnect.max_delay"
            ));
            Ok(())
        });
    }

    #[test]
    fn saved_options_load_back() {
        Jail::expect_with(|_jail| {
            let options = RuntimeOptions {
                ping_interval_secs: 5,
                ..RuntimeOptions::default()
            };
            let path = Path::new("nested/config.toml");
            save_runtime_options(&options, path).map_err(|e| e.to_string())?;
            assert_eq!(load_runtime_options(path).unwrap(), options);
            Ok(())
        });
    }
}
