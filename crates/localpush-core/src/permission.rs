// ── Permission gate ──
//
// Tracks the OS capabilities a session needs and drives the prompt.
// At most one prompt is ever outstanding: concurrent `request()` calls
// share the same future.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::settings::SystemType;

/// An OS capability the connection depends on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
    /// Needed to read the Wi-Fi SSID for allow-list matching.
    Location,
    /// Long-running background service (Android).
    ForegroundService,
    /// Posting notifications while backgrounded.
    Notifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Grant {
    Granted,
    Denied,
    Undetermined,
}

/// Capabilities required before a session may start.
pub fn required_capabilities(system_type: SystemType) -> BTreeSet<Capability> {
    match system_type {
        SystemType::Android => [
            Capability::Location,
            Capability::ForegroundService,
            Capability::Notifications,
        ]
        .into(),
        SystemType::Ios => [Capability::Location, Capability::Notifications].into(),
        SystemType::Windows | SystemType::Macos | SystemType::Linux => {
            [Capability::Notifications].into()
        }
    }
}

/// Grant per required capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionState {
    pub grants: BTreeMap<Capability, Grant>,
}

impl PermissionState {
    pub fn all_granted(&self) -> bool {
        self.grants.values().all(|g| *g == Grant::Granted)
    }

    pub fn missing(&self) -> Vec<Capability> {
        self.grants
            .iter()
            .filter(|(_, g)| **g != Grant::Granted)
            .map(|(c, _)| *c)
            .collect()
    }

    pub fn get(&self, capability: Capability) -> Option<Grant> {
        self.grants.get(&capability).copied()
    }
}

/// OS permission surface implemented by the host.
#[async_trait]
pub trait PermissionPlatform: Send + Sync {
    /// Current grant, without prompting.
    fn status(&self, capability: Capability) -> Grant;

    /// Prompt for all of `capabilities` and wait until the user has
    /// answered every one.
    async fn prompt(&self, capabilities: Vec<Capability>)
    -> Result<Vec<(Capability, Grant)>, CoreError>;
}

/// Platform without runtime permission prompts (desktop hosts).
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionPlatform for AlwaysGranted {
    fn status(&self, _capability: Capability) -> Grant {
        Grant::Granted
    }

    async fn prompt(
        &self,
        capabilities: Vec<Capability>,
    ) -> Result<Vec<(Capability, Grant)>, CoreError> {
        Ok(capabilities
            .into_iter()
            .map(|cap| (cap, Grant::Granted))
            .collect())
    }
}

type PromptFuture = Shared<BoxFuture<'static, Result<bool, String>>>;

/// Gates session start on required capabilities.
pub struct PermissionGate {
    platform: Arc<dyn PermissionPlatform>,
    required: ArcSwap<BTreeSet<Capability>>,
    grants: Arc<DashMap<Capability, Grant>>,
    inflight: Mutex<Option<PromptFuture>>,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn PermissionPlatform>, system_type: SystemType) -> Self {
        Self {
            platform,
            required: ArcSwap::from_pointee(required_capabilities(system_type)),
            grants: Arc::new(DashMap::new()),
            inflight: Mutex::new(None),
        }
    }

    /// Switch the required set after the host platform is (re)declared.
    pub fn set_system_type(&self, system_type: SystemType) {
        self.required
            .store(Arc::new(required_capabilities(system_type)));
    }

    pub fn required(&self) -> BTreeSet<Capability> {
        self.required.load().as_ref().clone()
    }

    /// Query current grants from the platform.
    pub fn check(&self) -> PermissionState {
        let grants = self
            .required
            .load()
            .iter()
            .map(|cap| {
                let grant = self.platform.status(*cap);
                self.grants.insert(*cap, grant);
                (*cap, grant)
            })
            .collect();
        PermissionState { grants }
    }

    /// Fail with [`CoreError::PermissionDenied`] unless everything is granted.
    pub fn ensure_granted(&self) -> Result<(), CoreError> {
        let state = self.check();
        if state.all_granted() {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                missing: state.missing(),
            })
        }
    }

    /// Prompt for every ungranted capability.
    ///
    /// Resolves `true` immediately when nothing is missing. Calls made
    /// while a prompt is showing join it instead of opening another.
    pub async fn request(&self) -> Result<bool, CoreError> {
        let prompt = {
            let mut slot = self
                .inflight
                .lock()
                .map_err(|_| CoreError::Internal("permission slot poisoned".into()))?;

            if let Some(existing) = slot.as_ref() {
                debug!("joining outstanding permission prompt");
                existing.clone()
            } else {
                let missing = self.check().missing();
                if missing.is_empty() {
                    return Ok(true);
                }
                let prompt = self.spawn_prompt(missing);
                *slot = Some(prompt.clone());
                prompt
            }
        };

        let result = prompt.clone().await;

        if let Ok(mut slot) = self.inflight.lock() {
            if slot.as_ref().is_some_and(|f| f.ptr_eq(&prompt)) {
                *slot = None;
            }
        }

        result.map_err(|message| CoreError::PermissionUnavailable { message })
    }

    fn spawn_prompt(&self, missing: Vec<Capability>) -> PromptFuture {
        let platform = Arc::clone(&self.platform);
        let grants = Arc::clone(&self.grants);

        async move {
            info!(capabilities = ?missing, "requesting permissions");
            let answers = platform.prompt(missing.clone()).await.map_err(|e| {
                warn!(error = %e, "permission prompt failed");
                e.to_string()
            })?;

            for (cap, grant) in &answers {
                grants.insert(*cap, *grant);
            }
            let granted = missing
                .iter()
                .all(|cap| grants.get(cap).is_some_and(|g| *g == Grant::Granted));
            info!(granted, "permission prompt answered");
            Ok(granted)
        }
        .boxed()
        .shared()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Grants everything after a short delay and counts prompts.
    #[derive(Default)]
    struct SlowPrompt {
        prompts: AtomicUsize,
        granted: DashMap<Capability, Grant>,
        deny: Option<Capability>,
    }

    #[async_trait]
    impl PermissionPlatform for SlowPrompt {
        fn status(&self, capability: Capability) -> Grant {
            self.granted
                .get(&capability)
                .map_or(Grant::Undetermined, |g| *g)
        }

        async fn prompt(
            &self,
            capabilities: Vec<Capability>,
        ) -> Result<Vec<(Capability, Grant)>, CoreError> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(capabilities
                .into_iter()
                .map(|cap| {
                    let grant = if Some(cap) == self.deny {
                        Grant::Denied
                    } else {
                        Grant::Granted
                    };
                    self.granted.insert(cap, grant);
                    (cap, grant)
                })
                .collect())
        }
    }

    #[test]
    fn required_sets_by_platform() {
        assert_eq!(required_capabilities(SystemType::Android).len(), 3);
        assert!(required_capabilities(SystemType::Ios).contains(&Capability::Location));
        assert_eq!(
            required_capabilities(SystemType::Linux),
            BTreeSet::from([Capability::Notifications])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_prompt() {
        let platform = Arc::new(SlowPrompt::default());
        let gate = PermissionGate::new(platform.clone(), SystemType::Android);

        let (a, b, c) = tokio::join!(gate.request(), gate.request(), gate.request());
        assert!(a.unwrap() && b.unwrap() && c.unwrap());
        assert_eq!(platform.prompts.load(Ordering::SeqCst), 1);
        assert!(gate.check().all_granted());

        // Nothing missing: resolves without prompting.
        assert!(gate.request().await.unwrap());
        assert_eq!(platform.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn denial_blocks_start() {
        let platform = Arc::new(SlowPrompt {
            deny: Some(Capability::Location),
            ..SlowPrompt::default()
        });
        let gate = PermissionGate::new(platform, SystemType::Ios);

        assert!(!gate.request().await.unwrap());
        let err = gate.ensure_granted().unwrap_err();
        let CoreError::PermissionDenied { missing } = err else {
            panic!("expected a permission error, got {err:?}");
        };
        assert_eq!(missing, [Capability::Location]);
    }

    #[test]
    fn system_type_switch_changes_requirements() {
        let gate = PermissionGate::new(Arc::new(SlowPrompt::default()), SystemType::Linux);
        assert_eq!(gate.check().grants.len(), 1);
        gate.set_system_type(SystemType::Android);
        assert_eq!(gate.check().missing().len(), 3);
    }
}
