use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixguard_core::Clock;
use tokio::time::Instant;

/// Clock whose wall time only moves when told to.
///
/// The monotonic side follows the Tokio clock, so paused-time tests advance it
/// with `tokio::time::advance`.
#[derive(Debug)]
pub struct ManualClock {
    utc: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            utc: Mutex::new(start),
        }
    }

    /// Jump the wall clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.utc.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Move the wall clock forward.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.utc.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        *self.utc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
