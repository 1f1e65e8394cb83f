use std::fmt;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Time source injected into components that stamp or schedule events.
///
/// `now` is a Tokio instant so paused-time tests drive it with `tokio::time::advance`.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic now.
    fn now(&self) -> Instant;
    /// Wall-clock now.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Clock backed by the Tokio timer and the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
