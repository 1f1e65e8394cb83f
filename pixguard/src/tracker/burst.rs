use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use pixguard_core::ActivityKind;
use tokio::time::Instant;

/// Per-actor sliding windows of recent event instants, one per direction.
#[derive(Debug, Default)]
pub(crate) struct BurstWindows {
    windows: HashMap<(String, ActivityKind), VecDeque<Instant>>,
}

fn prune(events: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = events.front() {
        if now.saturating_duration_since(*front) > window {
            events.pop_front();
        } else {
            break;
        }
    }
}

impl BurstWindows {
    /// Record an event at `at` and return how many events the window now holds.
    pub(crate) fn record(
        &mut self,
        actor_id: &str,
        kind: ActivityKind,
        at: Instant,
        window: Duration,
    ) -> usize {
        let events = self.windows.entry((actor_id.to_owned(), kind)).or_default();
        events.push_back(at);
        prune(events, at, window);
        events.len()
    }

    /// Drop events older than `window` across every actor.
    pub(crate) fn prune_all(&mut self, now: Instant, window: Duration) -> usize {
        let mut dropped = 0;
        self.windows.retain(|_, events| {
            let before = events.len();
            prune(events, now, window);
            dropped += before - events.len();
            !events.is_empty()
        });
        dropped
    }

    pub(crate) fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn counts_only_events_inside_the_window() {
        let t0 = Instant::now();
        let mut w = BurstWindows::default();
        assert_eq!(w.record("1", ActivityKind::Vandal, t0, WINDOW), 1);
        assert_eq!(w.record("1", ActivityKind::Vandal, t0 + Duration::from_secs(200), WINDOW), 2);
        assert_eq!(w.record("1", ActivityKind::Vandal, t0 + Duration::from_secs(301), WINDOW), 2);
        assert_eq!(w.record("1", ActivityKind::Restore, t0, WINDOW), 1);
    }

    #[test]
    fn prune_all_forgets_idle_actors() {
        let t0 = Instant::now();
        let mut w = BurstWindows::default();
        w.record("1", ActivityKind::Vandal, t0, WINDOW);
        w.record("2", ActivityKind::Restore, t0 + Duration::from_secs(250), WINDOW);
        assert_eq!(w.prune_all(t0 + Duration::from_secs(400), WINDOW), 1);
        assert_eq!(w.tracked(), 1);
    }
}
