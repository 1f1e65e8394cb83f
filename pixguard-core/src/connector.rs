use std::sync::Arc;

use async_trait::async_trait;
use pixguard_types::{PainterInfo, PixelCoordinate, PixguardError, TileCoord};

/// Raw PNG bytes of one tile, cheap to clone and share with the cache.
pub type TileBytes = Arc<[u8]>;

/// Source of tile images.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Stable connector name for logging and layer introspection.
    fn name(&self) -> &'static str;

    /// Remote host key used for rate limiting.
    fn host(&self) -> &str;

    /// Fetch one tile. Cache layers may answer this without going upstream.
    async fn fetch_tile(&self, tile: TileCoord) -> Result<TileBytes, PixguardError>;

    /// Fetch one tile, bypassing any cache layer.
    async fn fetch_tile_fresh(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        self.fetch_tile(tile).await
    }
}

/// Point lookup resolving who painted a pixel.
#[async_trait]
pub trait PainterLookup: Send + Sync {
    /// Stable connector name for logging and layer introspection.
    fn name(&self) -> &'static str;

    /// Remote host key used for rate limiting.
    fn host(&self) -> &str;

    /// Resolve the painter of `pixel`.
    ///
    /// `Ok(None)` means the upstream reports no painter for the pixel.
    async fn lookup(&self, pixel: PixelCoordinate) -> Result<Option<PainterInfo>, PixguardError>;
}
