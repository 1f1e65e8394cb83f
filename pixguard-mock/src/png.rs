use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use pixguard_core::TileBytes;

/// Encode an RGBA image as PNG bytes.
///
/// # Panics
/// Panics if encoding fails, which only happens for zero-sized images.
#[must_use]
pub fn encode_png(img: &RgbaImage) -> TileBytes {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("in-memory PNG encoding");
    out.into_inner().into()
}

/// A `size`x`size` tile filled with one color.
#[must_use]
pub fn solid_tile_png(size: u32, rgba: [u8; 4]) -> TileBytes {
    encode_png(&RgbaImage::from_pixel(size, size, Rgba(rgba)))
}

/// A transparent image with opaque pixels at `points`.
#[must_use]
pub fn mask_png(width: u32, height: u32, points: &[(u32, u32)]) -> TileBytes {
    let mut img = RgbaImage::new(width, height);
    for &(x, y) in points {
        if x < width && y < height {
            img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }
    encode_png(&img)
}
