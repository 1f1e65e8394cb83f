//! Canvas geometry: absolute pixel coordinates, tile coordinates and crop rectangles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Edge length, in pixels, of one upstream tile.
pub const TILE_SIZE: u32 = 1000;

/// A pixel in canvas-absolute space.
///
/// Persisted documents key pixels by the canonical `"(x, y)"` string returned by
/// [`PixelCoordinate::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelCoordinate {
    /// Absolute x.
    pub x: u32,
    /// Absolute y.
    pub y: u32,
}

impl PixelCoordinate {
    /// Construct a coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Build an absolute coordinate from a tile and an in-tile offset.
    #[must_use]
    pub const fn from_tile(tile: TileCoord, px: u32, py: u32) -> Self {
        Self {
            x: tile.x * TILE_SIZE + px,
            y: tile.y * TILE_SIZE + py,
        }
    }

    /// Tile containing this pixel.
    #[must_use]
    pub const fn tile(self) -> TileCoord {
        TileCoord {
            x: self.x / TILE_SIZE,
            y: self.y / TILE_SIZE,
        }
    }

    /// Offset of this pixel inside its tile.
    #[must_use]
    pub const fn in_tile(self) -> (u32, u32) {
        (self.x % TILE_SIZE, self.y % TILE_SIZE)
    }

    /// Canonical map key, `"(x, y)"`.
    #[must_use]
    pub fn key(self) -> String {
        self.to_string()
    }

    /// Parse a canonical key produced by [`PixelCoordinate::key`].
    #[must_use]
    pub fn parse_key(key: &str) -> Option<Self> {
        let inner = key.trim().strip_prefix('(')?.strip_suffix(')')?;
        let (x, y) = inner.split_once(',')?;
        Some(Self {
            x: x.trim().parse().ok()?,
            y: y.trim().parse().ok()?,
        })
    }
}

impl fmt::Display for PixelCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Integer grid coordinate of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Tile column.
    pub x: u32,
    /// Tile row.
    pub y: u32,
}

impl TileCoord {
    /// Construct a tile coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Tile offset by `(dx, dy)` grid cells.
    #[must_use]
    pub const fn offset(self, dx: u32, dy: u32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

/// Axis-aligned rectangle in the pixel space of a stitched grid (origin at the grid's top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropRect {
    /// Construct a rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// True if the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with `other`, or `None` if they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        (x1 > x0 && y1 > y0).then(|| Self::new(x0, y0, x1 - x0, y1 - y0))
    }
}
