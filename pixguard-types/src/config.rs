//! Configuration types shared across the pipeline, tracker and notification engine.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::deviation::NotificationMetric;
use crate::pixel::{PixelCoordinate, TILE_SIZE, TileCoord};

/// Per-host request pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum dispatches per second to one host.
    pub requests_per_second: u32,
    /// Bounded queue length per host; enqueue blocks when full.
    pub queue_capacity: usize,
}

impl RateLimitConfig {
    /// Pacing used for painter lookups.
    #[must_use]
    pub const fn lookups() -> Self {
        Self {
            requests_per_second: 1,
            queue_capacity: 100,
        }
    }

    /// Spacing between two dispatches. A zero rate is treated as one per second.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(1) / self.requests_per_second.max(1)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 3,
            queue_capacity: 100,
        }
    }
}

/// Tile download and cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Edge length of one tile in pixels.
    pub tile_size: u32,
    /// How long a downloaded tile stays cached.
    pub cache_ttl: Duration,
    /// Deadline for a single tile download.
    pub request_timeout: Duration,
    /// Deadline for a whole grid download.
    pub batch_timeout: Duration,
    /// Default parallelism for grid downloads.
    pub max_concurrency: usize,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            cache_ttl: Duration::from_secs(120),
            request_timeout: Duration::from_secs(15),
            batch_timeout: Duration::from_secs(60),
            max_concurrency: 8,
        }
    }
}

/// Exponential backoff applied to lookups after the upstream signals rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Floor delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied after each consecutive rate-limit signal (>= 1).
    pub factor: u32,
}

impl BackoffConfig {
    /// Floor delay.
    #[must_use]
    pub const fn min(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    /// Cap.
    #[must_use]
    pub const fn max(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
            factor: 2,
        }
    }
}

/// Top-left corner of the monitored region, as tile plus in-tile offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOrigin {
    /// Tile column.
    pub tile_x: u32,
    /// Tile row.
    pub tile_y: u32,
    /// Offset inside the tile (may exceed the tile size; it carries over).
    pub pixel_x: u32,
    /// Offset inside the tile (may exceed the tile size; it carries over).
    pub pixel_y: u32,
}

impl RegionOrigin {
    /// Canvas-absolute coordinate of the origin.
    #[must_use]
    pub const fn pixel(&self) -> PixelCoordinate {
        PixelCoordinate::from_tile(
            TileCoord::new(self.tile_x, self.tile_y),
            self.pixel_x,
            self.pixel_y,
        )
    }
}

impl Default for RegionOrigin {
    fn default() -> Self {
        Self {
            tile_x: 1818,
            tile_y: 806,
            pixel_x: 989,
            pixel_y: 358,
        }
    }
}

/// Activity tracker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Top-left of the monitored region; diff images are offset by this.
    pub origin: RegionOrigin,
    /// Region width in pixels.
    pub width: u32,
    /// Region height in pixels.
    pub height: u32,
    /// Directory holding the persisted documents.
    pub data_dir: PathBuf,
    /// Number of attribution workers.
    pub workers: usize,
    /// Attribution queue bound; `0` derives it from the region size.
    pub queue_capacity: usize,
    /// Period of the dirty-document flush.
    pub flush_interval: Duration,
    /// Period of the burst-window pruning task.
    pub burst_gc_interval: Duration,
    /// Events within `burst_window` that make an actor a burst actor.
    pub burst_threshold: usize,
    /// Lookback of the burst window.
    pub burst_window: Duration,
    /// Deadline for one upstream painter call; backoff and pacing waits are not counted.
    pub lookup_timeout: Duration,
    /// Timezone in which daily buckets are keyed.
    pub timezone: Tz,
}

impl TrackerConfig {
    /// Queue bound after applying the region-size default.
    #[must_use]
    pub fn effective_queue_capacity(&self) -> usize {
        if self.queue_capacity > 0 {
            return self.queue_capacity;
        }
        let area = (self.width as usize).saturating_mul(self.height as usize);
        if area == 0 { 4096 } else { area }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            origin: RegionOrigin::default(),
            width: 107,
            height: 142,
            data_dir: PathBuf::from("data"),
            workers: 1,
            queue_capacity: 0,
            flush_interval: Duration::from_secs(2),
            burst_gc_interval: Duration::from_secs(60),
            burst_threshold: 5,
            burst_window: Duration::from_secs(5 * 60),
            lookup_timeout: Duration::from_secs(8),
            timezone: chrono_tz::Asia::Tokyo,
        }
    }
}

/// Per-target notification settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Tier, zero-transition and mention events are only evaluated when enabled.
    pub auto_notify_enabled: bool,
    /// Debounce applied to tier escalations.
    pub delay: Duration,
    /// Base threshold in percent; values below it are tier `None`.
    pub threshold: f64,
    /// Threshold in percent above which escalations carry a mention.
    pub mention_threshold: f64,
    /// Which sample value drives the tiers.
    pub metric: NotificationMetric,
    /// Forward vandal burst actors to this target.
    pub vandal_alerts: bool,
    /// Forward restore burst actors to this target.
    pub restore_alerts: bool,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            auto_notify_enabled: true,
            delay: Duration::from_millis(500),
            threshold: 10.0,
            mention_threshold: 50.0,
            metric: NotificationMetric::Overall,
            vandal_alerts: true,
            restore_alerts: true,
        }
    }
}

/// Aggregate configuration consumed by the hub builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixguardConfig {
    /// Tile download and cache tuning.
    pub tiles: TileConfig,
    /// Pacing of tile downloads.
    pub tile_rate_limit: RateLimitConfig,
    /// Pacing of painter lookups.
    pub lookup_rate_limit: RateLimitConfig,
    /// Lookup backoff.
    pub backoff: BackoffConfig,
    /// Tracker tuning.
    pub tracker: TrackerConfig,
}

impl Default for PixguardConfig {
    fn default() -> Self {
        Self {
            tiles: TileConfig::default(),
            tile_rate_limit: RateLimitConfig::default(),
            lookup_rate_limit: RateLimitConfig::lookups(),
            backoff: BackoffConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}
