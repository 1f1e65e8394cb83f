//! Pixguard watches a region of a shared pixel canvas for vandalism.
//!
//! Overview
//! - `TilePipeline` downloads canvas tiles through a per-host rate limiter and a
//!   short-lived cache, and stitches them into one bitmap.
//! - `ActivityTracker` turns successive diff snapshots into per-actor vandal and
//!   restore statistics, attributed through a rate-limited, backoff-gated
//!   painter lookup, and persists them as JSON documents.
//! - `NotificationTierEngine` turns a running deviation percentage into
//!   debounced tier escalations, zero transitions and mention crossings.
//! - `LinkSessions` and `poll_link` let a user prove ownership of a painter
//!   account by painting an assigned pixel.
//! - `Pixguard` wires all of the above around two connectors.
//!
//! Key behaviors and trade-offs
//! - Diff ingestion is latest-wins: an unprocessed image is replaced by a newer
//!   one, trading completeness for bounded staleness.
//! - Only the delta between snapshots is attributed; the attribution queue is
//!   bounded and drops overflow instead of blocking ingestion.
//! - Lookup failures drop that pixel's attribution for the cycle; persistence
//!   failures are retried on the next flush.
//! - Tiers only escalate; a dip below a reached tier is silent until the
//!   deviation returns to zero.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use pixguard::Pixguard;
//! use pixguard_wplace::{WplacePixels, WplaceTiles};
//!
//! let hub = Pixguard::builder()
//!     .tile_source(Arc::new(WplaceTiles::new()?))
//!     .painter_lookup(Arc::new(WplacePixels::new()?))
//!     .data_dir("data")
//!     .build()?;
//! hub.start();
//! hub.ingest_diff(diff_png)?;
//! hub.shutdown().await?;
//! ```
//!
//! See `pixguard/examples/` for a runnable end-to-end demonstration.
#![warn(missing_docs)]

pub(crate) mod core;
pub mod link;
pub mod notify;
pub mod ranking;
pub mod tiles;
pub mod tracker;

pub use core::{Pixguard, PixguardBuilder};
pub use link::{Acquire, LinkConfig, LinkOutcome, LinkSession, LinkSessions, poll_link};
pub use notify::{NotificationTierEngine, Tier, TierEvent, TierSink};
pub use ranking::{RankingEntry, RankingKind};
pub use tiles::{TilePipeline, stitch, stitch_cropped};
pub use tracker::{ActivityTracker, ActorEventSink, DiffSummary, date_key};

pub use pixguard_middleware::{
    BackoffMiddleware, CacheMiddleware, LookupBuilder, RateLimitMiddleware, RateLimiter,
    TileSourceBuilder, TimeoutMiddleware,
};

// Re-export core types for convenience
pub use pixguard_core::{
    ActivityKind, ActorRecord, BackoffConfig, CategoryBreakdown, Clock, CropRect, DailyTotals,
    DeviationSample, LinkedIdentity, NotificationMetric, NotifySettings, PainterInfo,
    PainterLookup, PixelCoordinate, PixguardConfig, PixguardError, RateLimitConfig, RegionOrigin,
    Shutdown, ShutdownSignal, SystemClock, TILE_SIZE, TileBytes, TileConfig, TileCoord,
    TileSource, TrackerConfig, VandalIndexDocument, WatchTarget, parse_targets,
};
