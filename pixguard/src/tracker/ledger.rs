use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixguard_core::{
    ActivityKind, ActorRecord, DailyTotals, LinkedIdentity, PainterInfo, PixelCoordinate,
    PixguardError, VandalIndexDocument,
};
use tokio::time::Instant;

use super::burst::BurstWindows;

/// Which persisted documents changed since the last flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Dirty {
    pub(crate) actors: bool,
    pub(crate) index: bool,
    pub(crate) totals: bool,
}

impl Dirty {
    pub(crate) const fn any(self) -> bool {
        self.actors || self.index || self.totals
    }

    pub(crate) fn merge(&mut self, other: Self) {
        self.actors |= other.actors;
        self.index |= other.index;
        self.totals |= other.totals;
    }
}

/// Pixels that entered and left the diff between two snapshots, sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Delta {
    pub(crate) added: Vec<PixelCoordinate>,
    pub(crate) removed: Vec<PixelCoordinate>,
}

/// One queued attribution: a delta pixel and the direction it moved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Job {
    pub(crate) pixel: PixelCoordinate,
    pub(crate) kind: ActivityKind,
}

impl Job {
    pub(crate) const fn vandal(pixel: PixelCoordinate) -> Self {
        Self {
            pixel,
            kind: ActivityKind::Vandal,
        }
    }

    pub(crate) const fn restore(pixel: PixelCoordinate) -> Self {
        Self {
            pixel,
            kind: ActivityKind::Restore,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BurstRule {
    pub(crate) threshold: usize,
    pub(crate) window: Duration,
}

/// Outcome of merging one successful lookup.
#[derive(Debug)]
pub(crate) struct Attribution {
    pub(crate) kind: ActivityKind,
    pub(crate) actor_id: String,
    pub(crate) burst: Option<ActorRecord>,
}

/// All mutable tracker state. Guarded by the tracker's single lock.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pub(crate) actors: BTreeMap<String, ActorRecord>,
    pub(crate) snapshot: HashSet<PixelCoordinate>,
    pub(crate) index: BTreeMap<PixelCoordinate, String>,
    pub(crate) totals: DailyTotals,
    pub(crate) pending: HashSet<Job>,
    pub(crate) bursts: BurstWindows,
    pub(crate) dirty: Dirty,
}

impl Ledger {
    /// Rebuild state from persisted documents.
    ///
    /// The previous snapshot is seeded from the persisted pixel list, and only
    /// attributions for pixels in that list are kept.
    pub(crate) fn restore(
        actors: BTreeMap<String, ActorRecord>,
        index: &VandalIndexDocument,
        totals: DailyTotals,
    ) -> Self {
        let snapshot: HashSet<PixelCoordinate> = index.pixels().collect();
        let attributions = index
            .attributions()
            .into_iter()
            .filter(|(px, _)| snapshot.contains(px))
            .collect();
        Self {
            actors,
            snapshot,
            index: attributions,
            totals,
            ..Self::default()
        }
    }

    /// Replace the current snapshot wholesale and return the symmetric difference.
    pub(crate) fn replace_snapshot(
        &mut self,
        next: HashSet<PixelCoordinate>,
        date_key: &str,
    ) -> Delta {
        let mut added: Vec<_> = next.difference(&self.snapshot).copied().collect();
        let mut removed: Vec<_> = self.snapshot.difference(&next).copied().collect();
        added.sort_unstable();
        removed.sort_unstable();

        let before = self.index.len();
        self.index.retain(|px, _| next.contains(px));
        self.snapshot = next;

        if !added.is_empty() || !removed.is_empty() || before != self.index.len() {
            self.dirty.index = true;
        }
        if !added.is_empty() || !removed.is_empty() {
            self.totals
                .add(date_key, added.len() as u64, removed.len() as u64);
            self.dirty.totals = true;
        }
        Delta { added, removed }
    }

    /// Merge a successful lookup for `job`.
    ///
    /// Counters follow the direction the job was queued with. The index only
    /// follows it while the snapshot still agrees, so a pixel that left the
    /// diff during the lookup is never indexed.
    pub(crate) fn attribute(
        &mut self,
        job: Job,
        painter: &PainterInfo,
        at: DateTime<Utc>,
        date_key: &str,
        now: Instant,
        rule: BurstRule,
    ) -> Attribution {
        let Job { pixel, kind } = job;
        let in_diff = self.snapshot.contains(&pixel);
        let actor_id = painter.actor_id();
        let record = self
            .actors
            .entry(actor_id.clone())
            .or_insert_with(|| ActorRecord::new(actor_id.clone()));
        record.refresh_identity(painter);
        record.record(kind, at, date_key, pixel);

        match kind {
            ActivityKind::Vandal if in_diff => {
                self.index.insert(pixel, actor_id.clone());
                self.dirty.index = true;
            }
            ActivityKind::Restore if !in_diff => {
                if self.index.remove(&pixel).is_some() {
                    self.dirty.index = true;
                }
            }
            _ => {}
        }
        self.dirty.actors = true;

        let in_window = self.bursts.record(&actor_id, kind, now, rule.window);
        let burst = (in_window >= rule.threshold && !record.burst_notified(kind)).then(|| {
            record.mark_burst_notified(kind);
            record.clone()
        });
        Attribution {
            kind,
            actor_id,
            burst,
        }
    }

    /// Attach an external identity to the painter's record, creating it if needed.
    pub(crate) fn link(
        &mut self,
        painter: &PainterInfo,
        identity: LinkedIdentity,
        at: DateTime<Utc>,
    ) -> Result<ActorRecord, PixguardError> {
        let actor_id = painter.actor_id();
        if let Some(existing) = self.actors.get(&actor_id).and_then(|r| r.linked.as_ref())
            && existing.account_id != identity.account_id
        {
            return Err(PixguardError::IdentityConflict {
                actor_id,
                linked_to: existing.account_id.clone(),
            });
        }
        let record = self
            .actors
            .entry(actor_id.clone())
            .or_insert_with(|| ActorRecord::new(actor_id));
        record.refresh_identity(painter);
        record.linked = Some(identity);
        record.last_seen = Some(at);
        self.dirty.actors = true;
        Ok(record.clone())
    }

    pub(crate) fn reset_burst_flags(&mut self, actor_id: &str) -> Result<(), PixguardError> {
        let record = self
            .actors
            .get_mut(actor_id)
            .ok_or_else(|| PixguardError::not_found(format!("actor {actor_id}")))?;
        record.reset_burst_flags();
        self.dirty.actors = true;
        Ok(())
    }

    pub(crate) fn index_document(&self) -> VandalIndexDocument {
        let mut pixels: Vec<PixelCoordinate> = self.snapshot.iter().copied().collect();
        pixels.sort_unstable();
        VandalIndexDocument {
            vandalized_pixels: pixels.into_iter().map(|px| [px.x, px.y]).collect(),
            pixel_to_painter: self
                .index
                .iter()
                .map(|(px, id)| (px.key(), id.clone()))
                .collect(),
        }
    }
}
