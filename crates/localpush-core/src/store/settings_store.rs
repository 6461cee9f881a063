use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::backend::SettingsBackend;
use crate::error::CoreError;
use crate::settings::{Configuration, SettingsPatch};

/// Mergeable settings with durable persistence.
///
/// `current()` is wait-free. `update()` merges over the newest record
/// (ours or one another process persisted), persists, and only then swaps
/// the snapshot in; a failed persist leaves the previous snapshot (and the
/// persisted record) untouched.
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    current: ArcSwap<Configuration>,
    changes: watch::Sender<Arc<Configuration>>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    /// Open the store, loading whatever the backend holds.
    pub fn open(backend: Arc<dyn SettingsBackend>) -> Result<Self, CoreError> {
        let initial = Arc::new(backend.load()?.unwrap_or_default());
        debug!(generation = initial.generation, "settings loaded");
        let (changes, _) = watch::channel(Arc::clone(&initial));

        Ok(Self {
            backend,
            current: ArcSwap::new(initial),
            changes,
            write_lock: Mutex::new(()),
        })
    }

    /// Latest committed snapshot.
    pub fn current(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Subscribe to committed snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Configuration>> {
        self.changes.subscribe()
    }

    /// Merge `patch` over the newest known record and persist the result.
    ///
    /// The backend is re-read first so a record written by another process
    /// sharing it is merged over instead of overwritten.
    pub fn update(&self, patch: &SettingsPatch) -> Result<Arc<Configuration>, CoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| CoreError::Internal("settings write lock poisoned".into()))?;

        let previous = self.newest(self.backend.load()?);
        let next = Arc::new(previous.merge(patch));

        if let Err(e) = self.backend.persist(&next) {
            warn!(error = %e, generation = next.generation, "settings update not persisted");
            return Err(e);
        }

        self.commit(Arc::clone(&next));
        debug!(generation = next.generation, "settings updated");
        Ok(next)
    }

    /// Re-read the backend, picking up writes from another process.
    pub fn reload(&self) -> Result<Arc<Configuration>, CoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| CoreError::Internal("settings write lock poisoned".into()))?;

        let Some(loaded) = self.backend.load()? else {
            return Ok(self.current.load_full());
        };

        let current = self.current.load_full();
        if loaded.generation < current.generation {
            // Another writer is behind us; our snapshot stays authoritative.
            debug!(
                loaded = loaded.generation,
                current = current.generation,
                "ignoring stale settings record"
            );
            return Ok(current);
        }

        let loaded = Arc::new(loaded);
        if *loaded != *current {
            self.commit(Arc::clone(&loaded));
        }
        Ok(loaded)
    }

    /// Pick the base for a merge: the persisted record unless it is older
    /// than our snapshot. Ties go to the persisted record.
    fn newest(&self, persisted: Option<Configuration>) -> Arc<Configuration> {
        let cached = self.current.load_full();
        match persisted {
            Some(record) if record.generation >= cached.generation => {
                if record != *cached {
                    debug!(
                        persisted = record.generation,
                        cached = cached.generation,
                        "merging over settings written elsewhere"
                    );
                }
                Arc::new(record)
            }
            _ => cached,
        }
    }

    fn commit(&self, config: Arc<Configuration>) {
        self.current.store(Arc::clone(&config));
        self.changes.send_replace(config);
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("current", &self.current.load())
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::settings::FieldUpdate;
    use crate::store::MemoryBackend;

    fn host(h: &str) -> SettingsPatch {
        SettingsPatch {
            host: FieldUpdate::Set(h.into()),
            ..SettingsPatch::default()
        }
    }

    #[test]
    fn update_persists_before_publishing() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::open(backend.clone()).unwrap();

        let next = store.update(&host("relay.example.com")).unwrap();
        assert_eq!(next.generation, 1);
        assert_eq!(backend.load().unwrap().unwrap().generation, 1);
        assert_eq!(store.current().host.as_deref(), Some("relay.example.com"));
    }

    #[test]
    fn failed_persist_keeps_previous_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::open(backend.clone()).unwrap();
        store.update(&host("a.example.com")).unwrap();

        backend.fail_writes(true);
        let err = store.update(&host("b.example.com")).unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));
        assert_eq!(store.current().host.as_deref(), Some("a.example.com"));
        assert_eq!(store.current().generation, 1);

        backend.fail_writes(false);
        assert_eq!(store.update(&host("b.example.com")).unwrap().generation, 2);
    }

    #[test]
    fn generation_continues_after_reopen() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = SettingsStore::open(backend.clone()).unwrap();
            store.update(&host("a")).unwrap();
            store.update(&host("b")).unwrap();
        }
        let reopened = SettingsStore::open(backend).unwrap();
        assert_eq!(reopened.current().generation, 2);
        assert_eq!(reopened.update(&host("c")).unwrap().generation, 3);
    }

    #[test]
    fn reload_picks_up_newer_records_only() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::open(backend.clone()).unwrap();
        store.update(&host("mine")).unwrap();

        // Another process wrote a newer record.
        let theirs = store.current().merge(&host("theirs"));
        backend.persist(&theirs).unwrap();
        assert_eq!(store.reload().unwrap().host.as_deref(), Some("theirs"));

        // A stale record does not roll us back.
        backend.persist(&Configuration::default()).unwrap();
        assert_eq!(store.reload().unwrap().host.as_deref(), Some("theirs"));
    }

    #[test]
    fn update_merges_over_records_written_elsewhere() {
        let backend = Arc::new(MemoryBackend::new());
        let app = SettingsStore::open(backend.clone()).unwrap();
        let service = SettingsStore::open(backend.clone()).unwrap();

        app.update(&SettingsPatch {
            connector_id: FieldUpdate::Set("u-1".into()),
            ..SettingsPatch::default()
        })
        .unwrap();
        let merged = service.update(&host("relay.example.com")).unwrap();

        assert_eq!(merged.generation, 2);
        assert_eq!(merged.connector_id.as_deref(), Some("u-1"));
        let stored = backend.load().unwrap().unwrap();
        assert_eq!(stored, *merged);
    }

    #[test]
    fn stale_record_does_not_roll_back_an_update() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::open(backend.clone()).unwrap();
        store.update(&host("a.example.com")).unwrap();
        store.update(&host("b.example.com")).unwrap();

        backend.persist(&Configuration::default()).unwrap();
        let next = store
            .update(&SettingsPatch {
                port: FieldUpdate::Set(443),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert_eq!(next.generation, 3);
        assert_eq!(next.host.as_deref(), Some("b.example.com"));
    }

    #[tokio::test]
    async fn subscribers_see_committed_snapshots() {
        let store = SettingsStore::open(Arc::new(MemoryBackend::new())).unwrap();
        let mut rx = store.subscribe();
        store.update(&host("relay")).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().host.as_deref(), Some("relay"));
    }
}
