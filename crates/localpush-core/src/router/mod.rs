// ── Message router ──
//
// Single path from every message source to the application. Ids are
// deduplicated inside a bounded window; with no attachment messages wait
// in a bounded FIFO that drops its oldest entry on overflow. Nothing in
// here ever blocks the caller.

mod dedup;
mod notifier;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use notifier::{SystemNotifier, TracingNotifier};

use self::dedup::DedupWindow;
use crate::model::{AppLifecycle, InboundMessage, MessageSource, MessageSystem};

/// Router tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// How many recent ids are remembered.
    pub dedup_capacity: usize,
    /// How long an id is remembered, in seconds.
    pub dedup_ttl_secs: u64,
    /// Messages held while no application is attached.
    pub queue_depth: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            dedup_capacity: 512,
            dedup_ttl_secs: 600,
            queue_depth: 64,
        }
    }
}

/// Result of handing a message to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the application.
    Accepted,
    /// Same id seen recently; dropped.
    Duplicate,
}

#[derive(Clone)]
pub struct MessageRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    state: Mutex<RouterState>,
    ready: Notify,
    notifier: Arc<dyn SystemNotifier>,
    queue_depth: usize,
}

struct RouterState {
    dedup: DedupWindow,
    queue: VecDeque<MessageSystem>,
    attachment: Option<u64>,
    next_attachment: u64,
    lifecycle: AppLifecycle,
    dropped: u64,
}

impl MessageRouter {
    pub fn new(options: &RouterOptions, notifier: Arc<dyn SystemNotifier>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                state: Mutex::new(RouterState {
                    dedup: DedupWindow::new(
                        options.dedup_capacity,
                        Duration::from_secs(options.dedup_ttl_secs),
                    ),
                    queue: VecDeque::new(),
                    attachment: None,
                    next_attachment: 0,
                    lifecycle: AppLifecycle::default(),
                    dropped: 0,
                }),
                ready: Notify::new(),
                notifier,
                queue_depth: options.queue_depth.max(1),
            }),
        }
    }

    /// Route one message. Safe to call from any task, never blocks on
    /// the application.
    pub fn deliver(&self, mut message: InboundMessage) -> Delivery {
        let surface = {
            let mut state = self.inner.lock();
            if !state.dedup.observe(&message.id, Instant::now()) {
                debug!(id = %message.id, source = %message.source, "duplicate message dropped");
                return Delivery::Duplicate;
            }
            message.source == MessageSource::Transport
                && state.lifecycle != AppLifecycle::Foreground
        };

        if surface {
            match self.inner.notifier.show(&message) {
                Ok(()) => message.delivered_via_system_notification = true,
                Err(e) => warn!(id = %message.id, error = %e, "system notification failed"),
            }
        }

        let outbound = message.to_message_system();
        {
            let mut state = self.inner.lock();
            state.queue.push_back(outbound);
            while state.queue.len() > self.inner.queue_depth {
                if let Some(old) = state.queue.pop_front() {
                    state.dropped = state.dropped.saturating_add(1);
                    warn!(
                        id = %old.id,
                        depth = self.inner.queue_depth,
                        total_dropped = state.dropped,
                        "delivery queue full, dropped oldest message"
                    );
                }
            }
        }

        debug!(id = %message.id, source = %message.source, "message accepted");
        self.inner.ready.notify_one();
        Delivery::Accepted
    }

    /// Attach the application. Replaces any previous attachment; queued
    /// messages are handed over in arrival order.
    pub fn attach(&self) -> AppAttachment {
        let id = {
            let mut state = self.inner.lock();
            let id = state.next_attachment;
            state.next_attachment = state.next_attachment.wrapping_add(1);
            if state.attachment.replace(id).is_some() {
                info!("application attachment replaced");
            }
            debug!(pending = state.queue.len(), "application attached");
            id
        };
        // Wake a replaced attachment so it observes it is stale.
        self.inner.ready.notify_waiters();

        AppAttachment {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    pub fn set_lifecycle(&self, lifecycle: AppLifecycle) {
        let mut state = self.inner.lock();
        if state.lifecycle != lifecycle {
            debug!(%lifecycle, "application lifecycle changed");
            state.lifecycle = lifecycle;
        }
    }

    pub fn lifecycle(&self) -> AppLifecycle {
        self.inner.lock().lifecycle
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().attachment.is_some()
    }

    /// Messages waiting for an attachment.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Messages discarded on overflow since start.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

impl RouterInner {
    fn lock(&self) -> MutexGuard<'_, RouterState> {
        // State stays consistent across a panicking holder: every
        // mutation is a single push/pop.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ── AppAttachment ────────────────────────────────────────────────────

/// The application's end of the router. Dropping it detaches.
pub struct AppAttachment {
    inner: Arc<RouterInner>,
    id: u64,
}

impl AppAttachment {
    /// Next message, or `None` once this attachment was replaced.
    pub async fn recv(&mut self) -> Option<MessageSystem> {
        let inner = Arc::clone(&self.inner);
        loop {
            let notified = inner.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(next) = self.try_recv() {
                return next;
            }
            notified.await;
        }
    }

    /// Non-blocking receive. `Some(None)` means the attachment is stale.
    pub fn try_recv(&mut self) -> Option<Option<MessageSystem>> {
        let mut state = self.inner.lock();
        if state.attachment != Some(self.id) {
            return Some(None);
        }
        state.queue.pop_front().map(Some)
    }

    /// Log the application's acknowledgement of a message.
    pub fn acknowledge(&self, message: &MessageSystem, result: Result<(), String>) {
        match result {
            Ok(()) => debug!(id = %message.id, "message acknowledged"),
            Err(reason) => warn!(id = %message.id, %reason, "application rejected message"),
        }
    }

    /// Turn the attachment into a stream of messages.
    pub fn into_stream(mut self) -> impl Stream<Item = MessageSystem> + Send {
        async_stream::stream! {
            while let Some(message) = self.recv().await {
                yield message;
            }
        }
    }
}

impl Drop for AppAttachment {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if state.attachment == Some(self.id) {
            state.attachment = None;
            debug!("application detached");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
