//! Connector wrappers that route every upstream call through a [`RateLimiter`].

use std::sync::Arc;

use async_trait::async_trait;
use pixguard_core::{Middleware, PainterLookup, Shutdown, TileBytes, TileSource};
use pixguard_types::{PainterInfo, PixelCoordinate, PixguardError, TileCoord};

use crate::rate_limit::RateLimiter;

/// Tile source whose downloads are paced per host.
pub struct RateLimitedTiles {
    inner: Arc<dyn TileSource>,
    limiter: RateLimiter,
    cancel: Shutdown,
}

impl RateLimitedTiles {
    /// Wrap `inner`; queued calls fail with `Cancelled` once `cancel` fires.
    pub fn new(inner: Arc<dyn TileSource>, limiter: RateLimiter, cancel: Shutdown) -> Self {
        Self {
            inner,
            limiter,
            cancel,
        }
    }
}

#[async_trait]
impl TileSource for RateLimitedTiles {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn fetch_tile(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        let inner = Arc::clone(&self.inner);
        self.limiter
            .execute(&self.cancel, self.inner.host(), move || async move {
                inner.fetch_tile(tile).await
            })
            .await
    }

    async fn fetch_tile_fresh(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        let inner = Arc::clone(&self.inner);
        self.limiter
            .execute(&self.cancel, self.inner.host(), move || async move {
                inner.fetch_tile_fresh(tile).await
            })
            .await
    }
}

/// Painter lookup whose calls are paced per host.
pub struct RateLimitedLookup {
    inner: Arc<dyn PainterLookup>,
    limiter: RateLimiter,
    cancel: Shutdown,
}

impl RateLimitedLookup {
    /// Wrap `inner`; queued calls fail with `Cancelled` once `cancel` fires.
    pub fn new(inner: Arc<dyn PainterLookup>, limiter: RateLimiter, cancel: Shutdown) -> Self {
        Self {
            inner,
            limiter,
            cancel,
        }
    }
}

#[async_trait]
impl PainterLookup for RateLimitedLookup {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn lookup(&self, pixel: PixelCoordinate) -> Result<Option<PainterInfo>, PixguardError> {
        let inner = Arc::clone(&self.inner);
        self.limiter
            .execute(&self.cancel, self.inner.host(), move || async move {
                inner.lookup(pixel).await
            })
            .await
    }
}

/// Middleware config for constructing the rate-limited wrappers.
pub struct RateLimitMiddleware {
    limiter: RateLimiter,
    cancel: Shutdown,
}

impl RateLimitMiddleware {
    /// Pace calls through `limiter`.
    #[must_use]
    pub const fn new(limiter: RateLimiter, cancel: Shutdown) -> Self {
        Self { limiter, cancel }
    }
}

impl Middleware<dyn TileSource> for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn TileSource>) -> Arc<dyn TileSource> {
        Arc::new(RateLimitedTiles::new(inner, self.limiter, self.cancel))
    }

    fn name(&self) -> &'static str {
        "RateLimited"
    }

    fn config_json(&self) -> serde_json::Value {
        rate_limit_json(&self.limiter)
    }
}

impl Middleware<dyn PainterLookup> for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn PainterLookup>) -> Arc<dyn PainterLookup> {
        Arc::new(RateLimitedLookup::new(inner, self.limiter, self.cancel))
    }

    fn name(&self) -> &'static str {
        "RateLimited"
    }

    fn config_json(&self) -> serde_json::Value {
        rate_limit_json(&self.limiter)
    }
}

fn rate_limit_json(limiter: &RateLimiter) -> serde_json::Value {
    let cfg = limiter.config();
    serde_json::json!({
        "requests_per_second": cfg.requests_per_second,
        "queue_capacity": cfg.queue_capacity,
    })
}
