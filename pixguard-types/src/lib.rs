//! Pixguard data model: canvas geometry, actor records, persisted documents,
//! deviation samples, configuration and the unified error type.
#![warn(missing_docs)]

mod actor;
mod config;
mod deviation;
mod documents;
mod error;
mod pixel;
mod targets;

pub use actor::{ActivityKind, ActorRecord, LinkedIdentity, PainterInfo};
pub use config::{
    BackoffConfig, NotifySettings, PixguardConfig, RateLimitConfig, RegionOrigin, TileConfig,
    TrackerConfig,
};
pub use deviation::{CategoryBreakdown, DeviationSample, NotificationMetric};
pub use documents::{
    ACTORS_FILE, DAILY_TOTALS_FILE, DailyTotals, VANDAL_INDEX_FILE, VandalIndexDocument,
};
pub use error::PixguardError;
pub use pixel::{CropRect, PixelCoordinate, TILE_SIZE, TileCoord};
pub use targets::{WatchTarget, parse_targets};
