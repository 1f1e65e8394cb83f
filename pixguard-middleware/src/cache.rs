//! Short-lived tile cache.
//!
//! Sits outside the rate limiter so cache hits never wait for a dispatch slot.
//! Only non-empty payloads are stored; `fetch_tile_fresh` bypasses the cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use pixguard_core::{Middleware, TileBytes, TileSource};
use pixguard_types::{PixguardError, TileCoord};
use tokio::time::Instant;

const DEFAULT_CAPACITY: u64 = 256;

#[derive(Clone)]
struct Entry {
    bytes: TileBytes,
    expires_at: Instant,
}

/// Tile source that keeps recent downloads for a fixed TTL.
pub struct CachedTileSource {
    inner: Arc<dyn TileSource>,
    store: Cache<TileCoord, Entry>,
    ttl: Duration,
}

impl CachedTileSource {
    /// Wrap `inner` with a cache holding up to `capacity` tiles for `ttl`.
    #[must_use]
    pub fn new(inner: Arc<dyn TileSource>, ttl: Duration, capacity: u64) -> Self {
        // moka evicts on its own clock; expiry is checked against the Tokio clock.
        let store = Cache::builder()
            .max_capacity(capacity.max(1))
            .time_to_live(ttl.max(Duration::from_millis(1)))
            .build();
        Self { inner, store, ttl }
    }

    /// Drop every cached tile.
    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    async fn cached(&self, tile: TileCoord) -> Option<TileBytes> {
        let entry = self.store.get(&tile).await?;
        if entry.expires_at > Instant::now() {
            return Some(entry.bytes);
        }
        self.store.invalidate(&tile).await;
        None
    }
}

#[async_trait]
impl TileSource for CachedTileSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn fetch_tile(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        if let Some(bytes) = self.cached(tile).await {
            #[cfg(feature = "tracing")]
            tracing::trace!(tile = %tile, "tile cache hit");
            return Ok(bytes);
        }
        let bytes = self.inner.fetch_tile(tile).await?;
        if !bytes.is_empty() {
            self.store
                .insert(
                    tile,
                    Entry {
                        bytes: Arc::clone(&bytes),
                        expires_at: Instant::now() + self.ttl,
                    },
                )
                .await;
        }
        Ok(bytes)
    }

    async fn fetch_tile_fresh(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        self.inner.fetch_tile_fresh(tile).await
    }
}

/// Middleware config for constructing a [`CachedTileSource`].
pub struct CacheMiddleware {
    ttl: Duration,
    capacity: u64,
}

impl CacheMiddleware {
    /// Cache tiles for `ttl`.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Override the maximum number of cached tiles.
    #[must_use]
    pub const fn capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }
}

impl Middleware<dyn TileSource> for CacheMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn TileSource>) -> Arc<dyn TileSource> {
        Arc::new(CachedTileSource::new(inner, self.ttl, self.capacity))
    }

    fn name(&self) -> &'static str {
        "CachedTileSource"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ttl_ms": u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX),
            "capacity": self.capacity,
        })
    }
}
