// ── Settings store ──
//
// Durable, mergeable configuration. Readers get lock-free snapshots;
// writers are serialized and only publish a snapshot after the backend
// has persisted it.

mod backend;
mod settings_store;

pub use backend::{MemoryBackend, SettingsBackend};
pub use settings_store::SettingsStore;
