//! Activity tracker: turns successive diff snapshots into attributed,
//! persisted per-actor statistics.
//!
//! Pixel lifecycle: not-in-diff -> in-diff (vandalized, indexed once a lookup
//! names the painter) -> not-in-diff (restored, unindexed) -> ...
//!
//! Behavior:
//! - a new snapshot wholly replaces the previous one; only the symmetric
//!   difference is queued for attribution, each pixel tagged with the
//!   direction it moved in and deduplicated against pending work
//! - attribution workers look painters up outside the lock and merge results
//!   under it; counters follow the queued direction
//! - the lookup handed in owns its timeouts, so a backoff gate delays
//!   attribution instead of dropping it
//! - three documents (actors, vandal index, daily totals) are flushed on a
//!   timer and once on shutdown, each only when dirty
//! - lookup and persistence failures are logged and never stop the workers

mod burst;
mod ledger;
mod store;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use pixguard_core::{
    ActivityKind, ActorRecord, Clock, DailyTotals, LatestSlot, LinkedIdentity, PainterInfo,
    PainterLookup, PixelCoordinate, PixguardError, Shutdown, TrackerConfig, WorkerGroup,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ranking::{RankingEntry, RankingKind, rank};
use ledger::{BurstRule, Job, Ledger};
use store::Store;

/// Receiver of "new burst actor" events.
///
/// `actor` is a detached copy of the record at the moment the burst was detected.
pub trait ActorEventSink: Send + Sync {
    /// Called once per actor and direction until the flags are reset.
    fn on_burst(&self, kind: ActivityKind, actor: ActorRecord);
}

impl<F> ActorEventSink for F
where
    F: Fn(ActivityKind, ActorRecord) + Send + Sync,
{
    fn on_burst(&self, kind: ActivityKind, actor: ActorRecord) {
        self(kind, actor);
    }
}

/// Result of applying one diff snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Pixels in the new snapshot.
    pub pixels: usize,
    /// Pixels that entered the diff.
    pub added: usize,
    /// Pixels that left the diff.
    pub removed: usize,
    /// Delta pixels queued for attribution.
    pub enqueued: usize,
    /// Delta pixels not queued because the queue was full.
    pub dropped: usize,
}

struct Inner {
    cfg: TrackerConfig,
    lookup: Arc<dyn PainterLookup>,
    clock: Arc<dyn Clock>,
    store: Store,
    state: Mutex<Ledger>,
    sink: RwLock<Option<Arc<dyn ActorEventSink>>>,
    queue_tx: mpsc::Sender<Job>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<Job>>,
    diffs: LatestSlot<Vec<u8>>,
    flushing: tokio::sync::Mutex<()>,
}

/// Handle to the tracker; clones share state.
#[derive(Clone)]
pub struct ActivityTracker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ActivityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTracker")
            .field("data_dir", &self.inner.cfg.data_dir)
            .field("lookup", &self.inner.lookup.name())
            .finish_non_exhaustive()
    }
}

/// Date key (`YYYY-MM-DD`) of `at` in `tz`.
#[must_use]
pub fn date_key(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

impl ActivityTracker {
    /// Load persisted state from `cfg.data_dir` and build a tracker.
    ///
    /// `lookup` is called without an extra deadline; wrap it with
    /// `LookupBuilder::with_timeout` to bound each upstream call.
    ///
    /// Missing documents start empty. Malformed ones are moved aside and the
    /// tracker starts without them.
    /// No background work runs until [`spawn_workers`](Self::spawn_workers).
    pub fn open(
        cfg: TrackerConfig,
        lookup: Arc<dyn PainterLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Store::new(&cfg.data_dir);
        let ledger = store.load();
        let (queue_tx, queue_rx) = mpsc::channel(cfg.effective_queue_capacity().max(1));
        Self {
            inner: Arc::new(Inner {
                cfg,
                lookup,
                clock,
                store,
                state: Mutex::new(ledger),
                sink: RwLock::new(None),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                diffs: LatestSlot::new(),
                flushing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Tracker configuration.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.cfg
    }

    /// Register the burst-actor sink, replacing any previous one.
    pub fn set_sink(&self, sink: Arc<dyn ActorEventSink>) {
        *self
            .inner
            .sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Spawn the diff worker, attribution workers, flush worker and burst GC into `group`.
    pub fn spawn_workers(&self, group: &mut WorkerGroup) {
        let workers = self.inner.cfg.workers.max(1);
        group.spawn(diff_worker(self.clone(), group.token()));
        for id in 0..workers {
            group.spawn(attribution_worker(self.clone(), id, group.token()));
        }
        group.spawn(flush_worker(self.clone(), group.token()));
        group.spawn(burst_gc_worker(self.clone(), group.token()));
        info!(attribution_workers = workers, "tracker workers started");
    }

    /// Hand a PNG diff image to the diff worker.
    ///
    /// Latest wins: an image that has not been processed yet is replaced.
    /// Returns `true` when a stale image was discarded.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an empty payload.
    pub fn enqueue_diff_image(&self, png: impl AsRef<[u8]>) -> Result<bool, PixguardError> {
        let png = png.as_ref().to_vec();
        if png.is_empty() {
            return Err(PixguardError::InvalidArg("empty diff image".into()));
        }
        let displaced = self.inner.diffs.put(png).is_some();
        if displaced {
            debug!("stale diff image replaced before processing");
        }
        Ok(displaced)
    }

    /// Decode a PNG diff image and apply it as the new snapshot.
    ///
    /// Every pixel with non-zero alpha is in the diff; coordinates are offset by
    /// the configured region origin.
    ///
    /// # Errors
    /// Returns `Decode` if the image cannot be decoded; state is left untouched.
    pub fn update_diff_image(&self, png: &[u8]) -> Result<DiffSummary, PixguardError> {
        let img = image::load_from_memory(png)
            .map_err(|e| PixguardError::Decode(format!("diff image: {e}")))?
            .to_rgba8();
        let origin = self.inner.cfg.origin.pixel();
        let pixels = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[3] != 0)
            .map(|(x, y, _)| PixelCoordinate::new(origin.x + x, origin.y + y));
        Ok(self.update_diff_pixels(pixels))
    }

    /// Apply a canvas-absolute pixel set as the new snapshot.
    pub fn update_diff_pixels(
        &self,
        pixels: impl IntoIterator<Item = PixelCoordinate>,
    ) -> DiffSummary {
        let next: HashSet<PixelCoordinate> = pixels.into_iter().collect();
        let today = self.today();
        let mut summary = DiffSummary {
            pixels: next.len(),
            ..DiffSummary::default()
        };

        let mut state = self.state();
        let delta = state.replace_snapshot(next, &today);
        summary.added = delta.added.len();
        summary.removed = delta.removed.len();
        let jobs = delta
            .added
            .into_iter()
            .map(Job::vandal)
            .chain(delta.removed.into_iter().map(Job::restore));
        for job in jobs {
            if !state.pending.insert(job) {
                continue;
            }
            match self.inner.queue_tx.try_send(job) {
                Ok(()) => summary.enqueued += 1,
                Err(TrySendError::Full(job) | TrySendError::Closed(job)) => {
                    state.pending.remove(&job);
                    summary.dropped += 1;
                }
            }
        }
        drop(state);

        if summary.dropped > 0 {
            warn!(dropped = summary.dropped, "attribution queue full; delta pixels dropped");
        }
        if summary.added + summary.removed > 0 {
            debug!(
                pixels = summary.pixels,
                added = summary.added,
                removed = summary.removed,
                enqueued = summary.enqueued,
                "diff applied"
            );
        }
        summary
    }

    /// Attribute every queued pixel on the calling task. Returns how many were processed.
    ///
    /// Intended for callers that do not run attribution workers.
    pub async fn process_queued(&self) -> usize {
        let mut processed = 0;
        loop {
            let next = self.inner.queue_rx.lock().await.try_recv().ok();
            let Some(job) = next else {
                return processed;
            };
            self.attribute(job).await;
            processed += 1;
        }
    }

    async fn attribute(&self, job: Job) {
        self.state().pending.remove(&job);

        let px = job.pixel;
        let painter = match self.inner.lookup.lookup(px).await {
            Err(err) if err.is_cancellation() => {
                debug!(pixel = %px, "painter lookup cancelled");
                return;
            }
            Err(err) => {
                warn!(
                    pixel = %px,
                    host = self.inner.lookup.host(),
                    error = %err,
                    "painter lookup failed"
                );
                return;
            }
            Ok(None) => {
                debug!(pixel = %px, "no painter recorded");
                return;
            }
            Ok(Some(painter)) => painter,
        };

        let at = self.inner.clock.utc_now();
        let today = date_key(at, self.inner.cfg.timezone);
        let rule = BurstRule {
            threshold: self.inner.cfg.burst_threshold.max(1),
            window: self.inner.cfg.burst_window,
        };
        let now = self.inner.clock.now();
        let outcome = self
            .state()
            .attribute(job, &painter, at, &today, now, rule);
        debug!(
            pixel = %px,
            actor_id = %outcome.actor_id,
            kind = outcome.kind.as_str(),
            "pixel attributed"
        );

        if let Some(record) = outcome.burst {
            info!(
                actor_id = %record.id,
                name = %record.display_name(),
                kind = outcome.kind.as_str(),
                "burst actor detected"
            );
            let sink = self
                .inner
                .sink
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(sink) = sink {
                sink.on_burst(outcome.kind, record);
            }
        }
    }

    /// Write every dirty document.
    ///
    /// Documents are serialized under the lock and written outside it. Failed
    /// documents stay dirty and are retried by the next flush. Concurrent
    /// flushes run one at a time, so a newer encoding is never overwritten by
    /// an older one.
    ///
    /// # Errors
    /// Returns the last `Persist` error when any document failed to write.
    pub async fn flush(&self) -> Result<(), PixguardError> {
        let _writer = self.inner.flushing.lock().await;
        let (dirty, docs) = {
            let mut state = self.state();
            let dirty = std::mem::take(&mut state.dirty);
            if !dirty.any() {
                return Ok(());
            }
            (dirty, Store::encode(&state, dirty))
        };
        let store = self.inner.store.clone();
        match tokio::task::spawn_blocking(move || store.write(docs)).await {
            Ok((failed, err)) => {
                if failed.any() {
                    self.state().dirty.merge(failed);
                }
                err.map_or(Ok(()), Err)
            }
            Err(join) => {
                self.state().dirty.merge(dirty);
                Err(PixguardError::Other(format!("flush task failed: {join}")))
            }
        }
    }

    /// Attach `identity` to `painter`'s record, creating the record if needed.
    ///
    /// # Errors
    /// Returns `IdentityConflict` if the actor is linked to a different account.
    pub fn link_identity(
        &self,
        painter: &PainterInfo,
        identity: LinkedIdentity,
    ) -> Result<ActorRecord, PixguardError> {
        let at = self.inner.clock.utc_now();
        let record = self.state().link(painter, identity, at)?;
        info!(actor_id = %record.id, "identity linked");
        Ok(record)
    }

    /// Re-arm both burst flags of `actor_id`.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown actor.
    pub fn reset_burst_flags(&self, actor_id: &str) -> Result<(), PixguardError> {
        self.state().reset_burst_flags(actor_id)
    }

    /// Today's date key in the reporting timezone.
    #[must_use]
    pub fn today(&self) -> String {
        date_key(self.inner.clock.utc_now(), self.inner.cfg.timezone)
    }

    /// Copy of one actor record.
    #[must_use]
    pub fn actor(&self, actor_id: &str) -> Option<ActorRecord> {
        self.state().actors.get(actor_id).cloned()
    }

    /// Copies of all actor records, ordered by id.
    #[must_use]
    pub fn actors(&self) -> Vec<ActorRecord> {
        self.state().actors.values().cloned().collect()
    }

    /// Attributed pixels of the current snapshot.
    #[must_use]
    pub fn vandal_index(&self) -> BTreeMap<PixelCoordinate, String> {
        self.state().index.clone()
    }

    /// Number of pixels in the current snapshot.
    #[must_use]
    pub fn snapshot_len(&self) -> usize {
        self.state().snapshot.len()
    }

    /// Number of pixels queued or being looked up.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }

    /// Copy of the daily aggregate counts.
    #[must_use]
    pub fn daily_totals(&self) -> DailyTotals {
        self.state().totals.clone()
    }

    /// Leaderboard for `date_key`; see [`rank`](crate::ranking::rank).
    #[must_use]
    pub fn daily_ranking(&self, date_key: &str, kind: RankingKind, limit: usize) -> Vec<RankingEntry> {
        rank(self.state().actors.values(), date_key, kind, limit)
    }

    fn prune_bursts(&self) -> (usize, usize) {
        let now = self.inner.clock.now();
        let mut state = self.state();
        let dropped = state.bursts.prune_all(now, self.inner.cfg.burst_window);
        (dropped, state.bursts.tracked())
    }

    fn state(&self) -> MutexGuard<'_, Ledger> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn diff_worker(tracker: ActivityTracker, cancel: Shutdown) {
    loop {
        let png = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            png = tracker.inner.diffs.take() => png,
        };
        if let Err(err) = tracker.update_diff_image(&png) {
            warn!(error = %err, "diff image rejected");
        }
    }
    debug!("diff worker stopped");
}

async fn attribution_worker(tracker: ActivityTracker, id: usize, cancel: Shutdown) {
    loop {
        let next = {
            let mut rx = tracker.inner.queue_rx.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = next else { break };
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tracker.attribute(job) => {}
        }
    }
    debug!(worker = id, "attribution worker stopped");
}

async fn flush_worker(tracker: ActivityTracker, cancel: Shutdown) {
    let mut ticker = tokio::time::interval(tracker.inner.cfg.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = tracker.flush().await {
                    warn!(error = %err, "periodic flush failed");
                }
            }
        }
    }
    if let Err(err) = tracker.flush().await {
        warn!(error = %err, "final flush failed");
    }
    debug!("flush worker stopped");
}

async fn burst_gc_worker(tracker: ActivityTracker, cancel: Shutdown) {
    let mut ticker = tokio::time::interval(tracker.inner.cfg.burst_gc_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let (dropped, tracked) = tracker.prune_bursts();
                if dropped > 0 {
                    debug!(dropped, tracked, "pruned burst windows");
                }
            }
        }
    }
}
