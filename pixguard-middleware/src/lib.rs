//! pixguard-middleware
//!
//! Connector wrappers: per-host rate limiting, a short-lived tile cache, a
//! backoff gate and a call deadline for painter lookups, and builders that
//! stack them.

mod backoff;
mod builder;
mod cache;
mod rate_limit;
mod throttle;
mod timeout;

pub use crate::backoff::{BackoffLookup, BackoffMiddleware};
pub use crate::builder::{ConnectorBuilder, LookupBuilder, TileSourceBuilder};
pub use crate::cache::{CacheMiddleware, CachedTileSource};
pub use crate::rate_limit::RateLimiter;
pub use crate::throttle::{RateLimitMiddleware, RateLimitedLookup, RateLimitedTiles};
pub use crate::timeout::{TimeoutLookup, TimeoutMiddleware};
