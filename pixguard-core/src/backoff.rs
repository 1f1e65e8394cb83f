use std::time::Duration;

use pixguard_types::BackoffConfig;
use tokio::time::Instant;

/// Exponential backoff state shared by every lookup behind one gate.
///
/// Pure value object: callers pass `now` in, so the transitions are testable
/// without sleeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    backoff_ms: u64,
    min_backoff_ms: u64,
    max_backoff_ms: u64,
    factor: u32,
    not_before: Option<Instant>,
}

impl Backoff {
    /// Fresh state at the floor delay.
    #[must_use]
    pub fn new(cfg: BackoffConfig) -> Self {
        let min = cfg.min_backoff_ms.min(cfg.max_backoff_ms);
        Self {
            backoff_ms: min,
            min_backoff_ms: min,
            max_backoff_ms: cfg.max_backoff_ms,
            factor: cfg.factor.max(1),
            not_before: None,
        }
    }

    /// Delay that the next rate-limit signal will impose.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Earliest instant at which the next call may go out, if any was set.
    #[must_use]
    pub const fn not_before(&self) -> Option<Instant> {
        self.not_before
    }

    /// Record a rate-limit signal observed at `now`.
    ///
    /// Sets the retry gate `now + delay` and grows the delay by `factor`, capped.
    /// Returns the new gate.
    pub fn on_rate_limited(&mut self, now: Instant) -> Instant {
        let delay = self.backoff_ms.min(self.max_backoff_ms);
        let gate = now + Duration::from_millis(delay);
        self.not_before = Some(self.not_before.map_or(gate, |prev| prev.max(gate)));
        self.backoff_ms = delay
            .saturating_mul(u64::from(self.factor))
            .min(self.max_backoff_ms);
        gate
    }

    /// Record a successful call: the delay drops back to the floor.
    pub const fn on_success(&mut self) {
        self.backoff_ms = self.min_backoff_ms;
    }

    /// How long a call issued at `now` must still wait.
    #[must_use]
    pub fn wait_for(&self, now: Instant) -> Option<Duration> {
        self.not_before
            .filter(|gate| *gate > now)
            .map(|gate| gate - now)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
