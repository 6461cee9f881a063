use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

/// Recently seen message ids, bounded by count and by age.
///
/// Insertion order is arrival order, so the oldest entry is always at
/// the front.
#[derive(Debug)]
pub(crate) struct DedupWindow {
    seen: IndexMap<String, Instant>,
    capacity: usize,
    ttl: Duration,
}

impl DedupWindow {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            seen: IndexMap::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Record `id`; `false` if it was already seen inside the window.
    pub(crate) fn observe(&mut self, id: &str, now: Instant) -> bool {
        self.expire(now);
        if self.seen.contains_key(id) {
            return false;
        }
        self.seen.insert(id.to_owned(), now);
        while self.seen.len() > self.capacity {
            self.seen.shift_remove_index(0);
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }

    fn expire(&mut self, now: Instant) {
        while let Some((_, at)) = self.seen.first() {
            if now.saturating_duration_since(*at) < self.ttl {
                break;
            }
            self.seen.shift_remove_index(0);
        }
    }
}
