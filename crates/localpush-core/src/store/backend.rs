use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::CoreError;
use crate::settings::Configuration;

/// Durable storage for the settings record.
///
/// Implementations must be readable from a process that never went
/// through a merge (a background-started host loads and connects).
pub trait SettingsBackend: Send + Sync {
    /// Load the persisted record, `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<Configuration>, CoreError>;

    /// Persist a record, replacing any previous one.
    fn persist(&self, config: &Configuration) -> Result<(), CoreError>;
}

/// In-process backend. Used by tests and by hosts that do not need
/// settings to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<Configuration>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(config: Configuration) -> Self {
        Self {
            slot: Mutex::new(Some(config)),
            ..Self::default()
        }
    }

    /// Make subsequent writes fail, simulating a full or read-only disk.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SettingsBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Configuration>, CoreError> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| CoreError::persistence("settings slot poisoned"))?;
        Ok(slot.clone())
    }

    fn persist(&self, config: &Configuration) -> Result<(), CoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoreError::persistence("write rejected by backend"));
        }
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CoreError::persistence("settings slot poisoned"))?;
        *slot = Some(config.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
