// ── Reconnect policy ──
//
// Exponential backoff with jitter. Pure functions of the attempt count
// and the time since the last successful connection; the session loop
// owns the timers.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay, clamped to `0.0..=1.0`.
    pub jitter: f64,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Give up once this long has passed without a successful connection.
    #[serde(with = "opt_millis")]
    pub max_elapsed: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
            max_retries: None,
            max_elapsed: None,
        }
    }
}

impl ReconnectPolicy {
    /// `min(max_delay, initial_delay * 2^attempt)`, without jitter.
    ///
    /// Non-decreasing in `attempt` and never above `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Base delay with uniform jitter in `±jitter`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let unit = rand::rng().random_range(-1.0..=1.0);
        self.jittered(attempt, unit)
    }

    /// Base delay scaled by `1 + jitter * unit`, `unit` in `-1.0..=1.0`.
    pub fn jittered(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        let scale = 1.0 + jitter * unit.clamp(-1.0, 1.0);
        Duration::try_from_secs_f64(base.as_secs_f64() * scale).unwrap_or(base)
    }

    /// Delay before retry number `attempt`, or `None` to give up.
    pub fn next_delay(&self, attempt: u32, since_success: Option<Duration>) -> Option<Duration> {
        if self.max_retries.is_some_and(|max| attempt >= max) {
            return None;
        }
        if let (Some(limit), Some(elapsed)) = (self.max_elapsed, since_success) {
            if elapsed >= limit {
                return None;
            }
        }
        Some(self.delay(attempt))
    }
}

/// Retry bookkeeping owned by one session.
#[derive(Debug)]
pub struct ReconnectState {
    attempt: u32,
    last_success: Instant,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            last_success: Instant::now(),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset the counter on every Connected transition.
    pub fn on_connected(&mut self) {
        self.attempt = 0;
        self.last_success = Instant::now();
    }

    /// Record a failure; returns the delay before the next try, or
    /// `None` once the policy gives up.
    pub fn on_failure(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        let delay = policy.next_delay(self.attempt, Some(self.last_success.elapsed()))?;
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|v| v.map(Duration::from_millis))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_is_non_decreasing_and_capped() {
        let policy = ReconnectPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..100 {
            let d = policy.base_delay(attempt);
            assert!(d >= previous, "attempt {attempt}: {d:?} < {previous:?}");
            assert!(d <= policy.max_delay);
            previous = d;
        }
        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(3), Duration::from_secs(8));
        assert_eq!(previous, policy.max_delay);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.jittered(2, -1.0), Duration::from_secs(3));
        assert_eq!(policy.jittered(2, 1.0), Duration::from_secs(5));
        for _ in 0..200 {
            let d = policy.delay(2);
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn max_retries_gives_up() {
        let policy = ReconnectPolicy {
            max_retries: Some(2),
            ..ReconnectPolicy::default()
        };
        assert!(policy.next_delay(0, None).is_some());
        assert!(policy.next_delay(1, None).is_some());
        assert!(policy.next_delay(2, None).is_none());
    }

    #[test]
    fn max_elapsed_gives_up() {
        let policy = ReconnectPolicy {
            max_elapsed: Some(Duration::from_secs(60)),
            ..ReconnectPolicy::default()
        };
        assert!(policy.next_delay(0, Some(Duration::from_secs(59))).is_some());
        assert!(policy.next_delay(0, Some(Duration::from_secs(60))).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn state_resets_after_connected() {
        let policy = ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        };
        let mut state = ReconnectState::new();
        assert_eq!(state.on_failure(&policy), Some(Duration::from_secs(1)));
        assert_eq!(state.on_failure(&policy), Some(Duration::from_secs(2)));
        assert_eq!(state.on_failure(&policy), Some(Duration::from_secs(4)));
        assert_eq!(state.attempt(), 3);

        state.on_connected();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.on_failure(&policy), Some(Duration::from_secs(1)));
    }

    #[test]
    fn policy_round_trips_through_toml_style_millis() {
        let json = serde_json::json!({ "initial_delay": 500, "max_delay": 10_000 });
        let policy: ReconnectPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.max_retries, None);
    }
}
