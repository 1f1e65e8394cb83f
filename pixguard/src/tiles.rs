//! Tile download and assembly.
//!
//! [`TilePipeline`] fetches tiles through whatever connector stack it was given
//! (normally cache over rate limiter over HTTP), and the free functions
//! [`stitch`] / [`stitch_cropped`] decode and assemble them.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use image::{ImageFormat, RgbaImage};
use pixguard_core::{
    CropRect, PixelCoordinate, PixguardError, TileBytes, TileConfig, TileCoord, TileSource,
};

/// Fetches and stitches fixed-size square tiles.
#[derive(Clone)]
pub struct TilePipeline {
    source: Arc<dyn TileSource>,
    cfg: TileConfig,
}

impl TilePipeline {
    /// Pipeline over an already-composed tile source.
    #[must_use]
    pub fn new(source: Arc<dyn TileSource>, cfg: TileConfig) -> Self {
        Self { source, cfg }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TileConfig {
        &self.cfg
    }

    /// Fetch one tile, answering from the cache layer when possible.
    ///
    /// # Errors
    /// Returns `Timeout` after the per-request timeout, or the connector's error.
    pub async fn fetch_tile(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        self.fetch_one(tile, false).await
    }

    /// Fetch one tile, bypassing the cache layer.
    ///
    /// # Errors
    /// Same as [`TilePipeline::fetch_tile`].
    pub async fn fetch_tile_fresh(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        self.fetch_one(tile, true).await
    }

    async fn fetch_one(&self, tile: TileCoord, fresh: bool) -> Result<TileBytes, PixguardError> {
        let call = async {
            if fresh {
                self.source.fetch_tile_fresh(tile).await
            } else {
                self.source.fetch_tile(tile).await
            }
        };
        tokio::time::timeout(self.cfg.request_timeout, call)
            .await
            .map_err(|_| PixguardError::timeout(format!("tile {tile}")))?
    }

    /// Fetch a `cols` x `rows` block of tiles starting at `origin`, row-major.
    ///
    /// Behavior:
    /// - At most `max_concurrency` downloads are in flight at once.
    /// - The first failure drops every in-flight sibling and is returned.
    /// - An empty payload counts as a failure.
    /// - The whole batch is bounded by `batch_timeout`.
    ///
    /// # Errors
    /// `InvalidArg` for an empty grid, `Timeout` when the batch deadline passes,
    /// `Data` for an empty tile, or the first tile error.
    pub async fn fetch_grid(
        &self,
        origin: TileCoord,
        cols: u32,
        rows: u32,
    ) -> Result<Vec<TileBytes>, PixguardError> {
        self.grid(origin, cols, rows, false).await
    }

    /// [`TilePipeline::fetch_grid`] with every tile fetched fresh.
    ///
    /// # Errors
    /// Same as [`TilePipeline::fetch_grid`].
    pub async fn fetch_grid_fresh(
        &self,
        origin: TileCoord,
        cols: u32,
        rows: u32,
    ) -> Result<Vec<TileBytes>, PixguardError> {
        self.grid(origin, cols, rows, true).await
    }

    async fn grid(
        &self,
        origin: TileCoord,
        cols: u32,
        rows: u32,
        fresh: bool,
    ) -> Result<Vec<TileBytes>, PixguardError> {
        if cols == 0 || rows == 0 {
            return Err(PixguardError::InvalidArg(format!(
                "tile grid must be non-empty, got {cols}x{rows}"
            )));
        }
        let batch = tokio::time::timeout(
            self.cfg.batch_timeout,
            self.grid_inner(origin, cols, rows, fresh),
        );
        batch
            .await
            .map_err(|_| PixguardError::timeout(format!("tile grid {origin} {cols}x{rows}")))?
    }

    async fn grid_inner(
        &self,
        origin: TileCoord,
        cols: u32,
        rows: u32,
        fresh: bool,
    ) -> Result<Vec<TileBytes>, PixguardError> {
        let total = (cols as usize) * (rows as usize);
        let coords = (0..rows).flat_map(|dy| (0..cols).map(move |dx| (dx, dy)));
        let mut downloads = stream::iter(coords.enumerate())
            .map(|(idx, (dx, dy))| {
                let tile = origin.offset(dx, dy);
                async move { (idx, tile, self.fetch_one(tile, fresh).await) }
            })
            .buffer_unordered(self.cfg.max_concurrency.max(1));

        let mut out: Vec<Option<TileBytes>> = vec![None; total];
        while let Some((idx, tile, res)) = downloads.next().await {
            let bytes = res.inspect_err(|e| {
                tracing::warn!(tile = %tile, error = %e, "tile download failed; aborting grid");
            })?;
            if bytes.is_empty() {
                tracing::warn!(tile = %tile, "empty tile payload; aborting grid");
                return Err(PixguardError::Data(format!("tile {tile} is empty")));
            }
            out[idx] = Some(bytes);
        }
        out.into_iter()
            .map(|slot| slot.ok_or_else(|| PixguardError::Other("tile grid incomplete".into())))
            .collect()
    }

    /// Fetch the tiles covering a `width` x `height` pixel region starting at
    /// `origin` and return exactly that region.
    ///
    /// # Errors
    /// `InvalidArg` for an empty region, or any grid/stitch error.
    pub async fn fetch_region(
        &self,
        origin: PixelCoordinate,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, PixguardError> {
        let (start, cols, rows, crop) = region_grid(origin, width, height, self.cfg.tile_size)?;
        let tiles = self.fetch_grid(start, cols, rows).await?;
        stitch_cropped(&tiles, self.cfg.tile_size, cols, rows, crop)
    }
}

/// Tile grid covering a pixel region, plus the region's rectangle inside that grid.
fn region_grid(
    origin: PixelCoordinate,
    width: u32,
    height: u32,
    tile_size: u32,
) -> Result<(TileCoord, u32, u32, CropRect), PixguardError> {
    if width == 0 || height == 0 || tile_size == 0 {
        return Err(PixguardError::InvalidArg(format!(
            "region must be non-empty, got {width}x{height} (tile size {tile_size})"
        )));
    }
    let last_x = origin
        .x
        .checked_add(width - 1)
        .ok_or_else(|| PixguardError::InvalidArg("region overflows canvas".into()))?;
    let last_y = origin
        .y
        .checked_add(height - 1)
        .ok_or_else(|| PixguardError::InvalidArg("region overflows canvas".into()))?;
    let start = TileCoord::new(origin.x / tile_size, origin.y / tile_size);
    let cols = last_x / tile_size - start.x + 1;
    let rows = last_y / tile_size - start.y + 1;
    let crop = CropRect::new(
        origin.x - start.x * tile_size,
        origin.y - start.y * tile_size,
        width,
        height,
    );
    Ok((start, cols, rows, crop))
}

fn check_grid(tiles: &[TileBytes], tile_size: u32, cols: u32, rows: u32) -> Result<(), PixguardError> {
    if tile_size == 0 || cols == 0 || rows == 0 {
        return Err(PixguardError::InvalidArg(format!(
            "invalid grid {cols}x{rows} with tile size {tile_size}"
        )));
    }
    let expected = (cols as usize) * (rows as usize);
    if tiles.len() != expected {
        return Err(PixguardError::InvalidArg(format!(
            "expected {expected} tiles for a {cols}x{rows} grid, got {}",
            tiles.len()
        )));
    }
    Ok(())
}

fn grid_extent(tile_size: u32, count: u32) -> Result<u32, PixguardError> {
    tile_size
        .checked_mul(count)
        .ok_or_else(|| PixguardError::InvalidArg("grid too large".into()))
}

fn decode_tile(bytes: &[u8], idx: usize) -> Result<RgbaImage, PixguardError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(|e| PixguardError::Decode(format!("tile #{idx}: {e}")))
}

/// Copy the part of `src` that falls inside `region` (grid coordinates) into
/// `dest`, whose top-left sits at `dest_origin` in grid coordinates.
fn blit(
    dest: &mut RgbaImage,
    dest_origin: (u32, u32),
    src: &RgbaImage,
    src_origin: (u32, u32),
    region: CropRect,
) {
    let dest_stride = dest.width() as usize * 4;
    let src_stride = src.width() as usize * 4;
    // Decoded tiles may be smaller than the nominal tile size.
    let src_right = src_origin.0 + src.width();
    let src_bottom = src_origin.1 + src.height();
    let x1 = region.right().min(src_right);
    let y1 = region.bottom().min(src_bottom);
    if x1 <= region.x || y1 <= region.y {
        return;
    }
    let row_bytes = (x1 - region.x) as usize * 4;
    let dest_buf: &mut [u8] = &mut **dest;
    let src_buf: &[u8] = src.as_raw();
    for gy in region.y..y1 {
        let s = (gy - src_origin.1) as usize * src_stride + (region.x - src_origin.0) as usize * 4;
        let d = (gy - dest_origin.1) as usize * dest_stride + (region.x - dest_origin.0) as usize * 4;
        dest_buf[d..d + row_bytes].copy_from_slice(&src_buf[s..s + row_bytes]);
    }
}

/// Decode a row-major grid of tiles into one bitmap covering the whole grid.
///
/// # Errors
/// `InvalidArg` when the tile count does not match `cols * rows` or a dimension
/// is zero; `Decode` when any tile is not a valid PNG.
pub fn stitch(
    tiles: &[TileBytes],
    tile_size: u32,
    cols: u32,
    rows: u32,
) -> Result<RgbaImage, PixguardError> {
    check_grid(tiles, tile_size, cols, rows)?;
    let full = CropRect::new(
        0,
        0,
        grid_extent(tile_size, cols)?,
        grid_extent(tile_size, rows)?,
    );
    stitch_cropped(tiles, tile_size, cols, rows, full)
}

/// Decode only the tiles that intersect `crop` and assemble that rectangle.
///
/// The output is sized to the part of `crop` inside the grid. Tiles outside it
/// are never decoded.
///
/// # Errors
/// `InvalidArg` for a grid/tile-count mismatch or a crop that misses the grid;
/// `Decode` when an intersecting tile is not a valid PNG.
pub fn stitch_cropped(
    tiles: &[TileBytes],
    tile_size: u32,
    cols: u32,
    rows: u32,
    crop: CropRect,
) -> Result<RgbaImage, PixguardError> {
    check_grid(tiles, tile_size, cols, rows)?;
    let grid = CropRect::new(
        0,
        0,
        grid_extent(tile_size, cols)?,
        grid_extent(tile_size, rows)?,
    );
    let crop = crop
        .intersect(&grid)
        .ok_or_else(|| PixguardError::InvalidArg(format!("crop {crop:?} lies outside the grid")))?;

    let mut dest = RgbaImage::new(crop.width, crop.height);
    for (idx, bytes) in tiles.iter().enumerate() {
        let tx = (idx % cols as usize) as u32;
        let ty = (idx / cols as usize) as u32;
        let cell = CropRect::new(tx * tile_size, ty * tile_size, tile_size, tile_size);
        let Some(region) = cell.intersect(&crop) else {
            continue;
        };
        let decoded = decode_tile(bytes, idx)?;
        blit(&mut dest, (crop.x, crop.y), &decoded, (cell.x, cell.y), region);
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixguard_mock::{encode_png, solid_tile_png};

    #[test]
    fn region_spanning_a_tile_seam() {
        let (start, cols, rows, crop) =
            region_grid(PixelCoordinate::new(1_818_989, 806_358), 107, 142, 1000).unwrap();
        assert_eq!(start, TileCoord::new(1818, 806));
        assert_eq!((cols, rows), (2, 1));
        assert_eq!(crop, CropRect::new(989, 358, 107, 142));
    }

    #[test]
    fn empty_region_is_rejected() {
        assert!(matches!(
            region_grid(PixelCoordinate::new(0, 0), 0, 5, 1000),
            Err(PixguardError::InvalidArg(_))
        ));
    }

    #[test]
    fn tile_count_mismatch_fails_fast() {
        let tiles = vec![solid_tile_png(2, [0, 0, 0, 255])];
        assert!(matches!(
            stitch(&tiles, 2, 2, 1),
            Err(PixguardError::InvalidArg(_))
        ));
    }

    #[test]
    fn malformed_tile_fails_assembly() {
        let tiles: Vec<TileBytes> = vec![Arc::from(&b"nope"[..])];
        assert!(matches!(stitch(&tiles, 2, 1, 1), Err(PixguardError::Decode(_))));
    }

    #[test]
    fn tiles_outside_the_crop_are_not_decoded() {
        let good = solid_tile_png(2, [5, 6, 7, 255]);
        let garbage: TileBytes = Arc::from(&b"not a png"[..]);
        let tiles = vec![good, garbage];
        let img = stitch_cropped(&tiles, 2, 2, 1, CropRect::new(0, 0, 2, 2)).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(1, 1).0, [5, 6, 7, 255]);
    }

    #[test]
    fn small_tiles_leave_the_rest_transparent() {
        let small = encode_png(&RgbaImage::from_pixel(1, 1, image::Rgba([9, 9, 9, 255])));
        let img = stitch(&[small], 2, 1, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [9, 9, 9, 255]);
        assert_eq!(img.get_pixel(1, 1).0, [0, 0, 0, 0]);
    }
}
