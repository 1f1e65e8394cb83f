use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use pixguard_core::{
    Clock, DeviationSample, LinkedIdentity, PainterLookup, PixguardConfig, PixguardError,
    ShutdownSignal, SystemClock, TileSource, WorkerGroup,
};
use pixguard_middleware::{LookupBuilder, RateLimiter, TileSourceBuilder};
use tracing::{debug, info, warn};

use crate::link::{LinkConfig, LinkOutcome, LinkSession, LinkSessions, poll_link};
use crate::notify::{NotificationTierEngine, TierEvent, TierSink};
use crate::tiles::TilePipeline;
use crate::tracker::ActivityTracker;

/// The assembled monitoring stack: tile pipeline, tracker, tier engine and
/// link registry sharing one set of limiters and one cancellation signal.
pub struct Pixguard {
    cfg: PixguardConfig,
    signal: ShutdownSignal,
    tile_limiter: RateLimiter,
    lookup_limiter: RateLimiter,
    tiles: TilePipeline,
    lookup: Arc<dyn PainterLookup>,
    tracker: ActivityTracker,
    engine: NotificationTierEngine,
    links: LinkSessions,
    workers: Mutex<Option<WorkerGroup>>,
}

/// Builder for constructing a [`Pixguard`] hub.
#[must_use]
pub struct PixguardBuilder {
    cfg: PixguardConfig,
    tile_source: Option<Arc<dyn TileSource>>,
    painter_lookup: Option<Arc<dyn PainterLookup>>,
    clock: Option<Arc<dyn Clock>>,
    tier_sink: Option<Arc<dyn TierSink>>,
    link_cfg: LinkConfig,
}

impl Default for PixguardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PixguardBuilder {
    /// Builder with default configuration and no connectors.
    pub fn new() -> Self {
        Self {
            cfg: PixguardConfig::default(),
            tile_source: None,
            painter_lookup: None,
            clock: None,
            tier_sink: None,
            link_cfg: LinkConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, cfg: PixguardConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Raw tile connector; limiter and cache are layered on top.
    pub fn tile_source(mut self, source: Arc<dyn TileSource>) -> Self {
        self.tile_source = Some(source);
        self
    }

    /// Raw painter lookup; limiter and backoff gate are layered on top.
    pub fn painter_lookup(mut self, lookup: Arc<dyn PainterLookup>) -> Self {
        self.painter_lookup = Some(lookup);
        self
    }

    /// Time source for timestamps, date keys and sessions. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receiver of tier and burst events. Defaults to logging them.
    pub fn tier_sink(mut self, sink: Arc<dyn TierSink>) -> Self {
        self.tier_sink = Some(sink);
        self
    }

    /// Directory of the tracker documents.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cfg.tracker.data_dir = dir.into();
        self
    }

    /// Identity-link session tuning.
    pub const fn link_config(mut self, cfg: LinkConfig) -> Self {
        self.link_cfg = cfg;
        self
    }

    /// Wire everything together and load persisted tracker state.
    ///
    /// Behavior:
    /// - tiles go through cache, then the tile limiter, then the raw source
    /// - lookups go through the backoff gate, then the lookup limiter, and only
    ///   the upstream call itself is bounded by `tracker.lookup_timeout`
    /// - the tier engine is registered as the tracker's burst sink
    /// - nothing runs in the background until [`Pixguard::start`]
    ///
    /// # Errors
    /// Returns `InvalidArg` when a connector is missing.
    pub fn build(self) -> Result<Pixguard, PixguardError> {
        let raw_tiles = self
            .tile_source
            .ok_or_else(|| PixguardError::InvalidArg("no tile source configured".into()))?;
        let raw_lookup = self
            .painter_lookup
            .ok_or_else(|| PixguardError::InvalidArg("no painter lookup configured".into()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sink = self.tier_sink.unwrap_or_else(|| Arc::new(log_event));

        let signal = ShutdownSignal::new();
        let tile_limiter = RateLimiter::new(self.cfg.tile_rate_limit);
        let lookup_limiter = RateLimiter::new(self.cfg.lookup_rate_limit);

        let tiles = TileSourceBuilder::new(raw_tiles)
            .with_rate_limit(tile_limiter.clone(), signal.subscribe())
            .with_cache(self.cfg.tiles.cache_ttl)
            .build();
        let lookup = LookupBuilder::new(raw_lookup)
            .with_rate_limit(lookup_limiter.clone(), signal.subscribe())
            .with_backoff(self.cfg.backoff, signal.subscribe())
            .with_timeout(self.cfg.tracker.lookup_timeout)
            .build();

        let tracker = ActivityTracker::open(
            self.cfg.tracker.clone(),
            Arc::clone(&lookup),
            Arc::clone(&clock),
        );
        let engine = NotificationTierEngine::new(sink);
        tracker.set_sink(Arc::new(engine.clone()));

        Ok(Pixguard {
            tiles: TilePipeline::new(tiles, self.cfg.tiles),
            cfg: self.cfg,
            signal,
            tile_limiter,
            lookup_limiter,
            lookup,
            tracker,
            engine,
            links: LinkSessions::new(self.link_cfg, clock),
            workers: Mutex::new(None),
        })
    }
}

fn log_event(target: &str, event: TierEvent) {
    info!(target_id = target, event = ?event, "notification event");
}

impl Pixguard {
    /// Start building a hub.
    pub fn builder() -> PixguardBuilder {
        PixguardBuilder::new()
    }

    /// Spawn the tracker workers. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.is_some() {
            return;
        }
        let mut group = WorkerGroup::new();
        self.tracker.spawn_workers(&mut group);
        info!(tasks = group.len(), "pixguard started");
        *workers = Some(group);
    }

    /// True between [`start`](Self::start) and [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop all background work and flush dirty documents once.
    ///
    /// In-flight limiter waits and backoff sleeps end with `Cancelled`, pending
    /// escalations are dropped.
    ///
    /// # Errors
    /// Returns the final flush's `Persist` error, if any.
    pub async fn shutdown(&self) -> Result<(), PixguardError> {
        let group = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.signal.trigger();
        if let Some(group) = group {
            group.stop().await;
        }
        self.tile_limiter.close();
        self.lookup_limiter.close();
        self.engine.cancel_all_pending();
        let flushed = self.tracker.flush().await;
        if let Err(err) = &flushed {
            warn!(error = %err, "flush on shutdown failed");
        }
        info!("pixguard stopped");
        flushed
    }

    /// Configuration the hub was built with.
    #[must_use]
    pub const fn config(&self) -> &PixguardConfig {
        &self.cfg
    }

    /// Cached, rate-limited tile pipeline.
    #[must_use]
    pub const fn tiles(&self) -> &TilePipeline {
        &self.tiles
    }

    /// Rate-limited, backoff-gated painter lookup with a per-call deadline.
    #[must_use]
    pub fn lookup(&self) -> Arc<dyn PainterLookup> {
        Arc::clone(&self.lookup)
    }

    /// Activity tracker.
    #[must_use]
    pub const fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Tier engine.
    #[must_use]
    pub const fn engine(&self) -> &NotificationTierEngine {
        &self.engine
    }

    /// Link session registry.
    #[must_use]
    pub const fn links(&self) -> &LinkSessions {
        &self.links
    }

    /// Hand a PNG diff image to the tracker's diff worker.
    ///
    /// # Errors
    /// Returns `InvalidArg` for an empty payload.
    pub fn ingest_diff(&self, png: impl AsRef<[u8]>) -> Result<bool, PixguardError> {
        self.tracker.enqueue_diff_image(png)
    }

    /// Feed a deviation sample to the tier engine.
    pub fn observe(&self, sample: &DeviationSample) {
        self.engine.update(sample);
    }

    /// Poll `session` until it links or lapses, then release it.
    ///
    /// On success the painter's record is linked to `session.user` with `handle`.
    ///
    /// # Errors
    /// Returns the initial lookup error, `Cancelled` on shutdown, or
    /// `IdentityConflict` if the painter is already linked elsewhere.
    pub async fn complete_link(
        &self,
        session: &LinkSession,
        handle: impl Into<String>,
    ) -> Result<LinkOutcome, PixguardError> {
        let every = self.links.config().poll_every;
        let polled = poll_link(
            self.lookup.as_ref(),
            session,
            every,
            &self.signal.subscribe(),
        )
        .await;
        self.links.release(&session.user);
        let outcome = polled?;
        if let LinkOutcome::Linked(painter) = &outcome {
            let identity = LinkedIdentity {
                account_id: session.user.clone(),
                handle: handle.into(),
            };
            self.tracker.link_identity(painter, identity)?;
        } else {
            debug!(user = %session.user, "link session lapsed");
        }
        Ok(outcome)
    }
}
