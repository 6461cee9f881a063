use std::fmt;

use tracing::debug;

use crate::error::CoreError;

/// Keeps the process alive while a session runs: a foreground service
/// on Android, a background task assertion on iOS, nothing on desktop.
pub trait KeepAlive: Send + Sync {
    fn acquire(&self) -> Result<KeepAliveGuard, CoreError>;
}

/// Held for as long as the keep-alive is needed; dropping releases it.
#[must_use = "the keep-alive is released as soon as the guard is dropped"]
pub struct KeepAliveGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl KeepAliveGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A guard that releases nothing.
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for KeepAliveGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for KeepAliveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAliveGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Desktop keep-alive: the process already runs in the foreground, so
/// this only logs the transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessKeepAlive;

impl KeepAlive for ProcessKeepAlive {
    fn acquire(&self) -> Result<KeepAliveGuard, CoreError> {
        debug!("keep-alive acquired");
        Ok(KeepAliveGuard::new(|| debug!("keep-alive released")))
    }
}
