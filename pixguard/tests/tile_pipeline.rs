use std::sync::Arc;
use std::time::Duration;

use pixguard::{
    CropRect, PixelCoordinate, PixguardError, TileConfig, TileCoord, TilePipeline,
    TileSourceBuilder, stitch, stitch_cropped,
};
use pixguard_mock::{MockBehavior, MockTiles, solid_tile_png};
use proptest::prelude::*;

const SIZE: u32 = 4;

fn cfg() -> TileConfig {
    TileConfig {
        tile_size: SIZE,
        ..TileConfig::default()
    }
}

fn colored_grid(mock: &MockTiles, origin: TileCoord, cols: u32, rows: u32) {
    for dy in 0..rows {
        for dx in 0..cols {
            let tile = origin.offset(dx, dy);
            let shade = u8::try_from(dy * cols + dx + 1).unwrap() * 10;
            mock.set_tile(tile, MockBehavior::Return(solid_tile_png(SIZE, [shade, 0, 0, 255])));
        }
    }
}

proptest! {
    #[test]
    fn cropped_single_tile_matches_direct_decode(
        colors in prop::array::uniform4(any::<[u8; 4]>()),
        pick in 0usize..4,
    ) {
        let tiles: Vec<_> = colors.iter().map(|c| solid_tile_png(SIZE, *c)).collect();
        let (tx, ty) = (pick as u32 % 2, pick as u32 / 2);
        let crop = CropRect::new(tx * SIZE, ty * SIZE, SIZE, SIZE);

        let stitched = stitch_cropped(&tiles, SIZE, 2, 2, crop).unwrap();
        let direct = image::load_from_memory(&tiles[pick]).unwrap().to_rgba8();
        prop_assert_eq!(stitched.dimensions(), (SIZE, SIZE));
        prop_assert_eq!(stitched.into_raw(), direct.into_raw());
    }
}

#[test]
fn full_stitch_places_tiles_row_major() {
    let tiles: Vec<_> = (1..=4u8)
        .map(|i| solid_tile_png(SIZE, [i, i, i, 255]))
        .collect();
    let img = stitch(&tiles, SIZE, 2, 2).unwrap();
    assert_eq!(img.dimensions(), (8, 8));
    assert_eq!(img.get_pixel(0, 0).0[0], 1);
    assert_eq!(img.get_pixel(7, 0).0[0], 2);
    assert_eq!(img.get_pixel(0, 7).0[0], 3);
    assert_eq!(img.get_pixel(7, 7).0[0], 4);
}

#[tokio::test]
async fn region_fetch_crops_across_tiles() {
    let mock = MockTiles::new();
    colored_grid(&mock, TileCoord::new(10, 20), 2, 2);
    let pipeline = TilePipeline::new(Arc::new(mock.clone()), cfg());

    let origin = PixelCoordinate::new(10 * SIZE + 3, 20 * SIZE + 2);
    let img = pipeline.fetch_region(origin, 3, 4).await.unwrap();

    assert_eq!(img.dimensions(), (3, 4));
    assert_eq!(img.get_pixel(0, 0).0[0], 10);
    assert_eq!(img.get_pixel(1, 0).0[0], 20);
    assert_eq!(img.get_pixel(0, 2).0[0], 30);
    assert_eq!(img.get_pixel(2, 3).0[0], 40);
    assert_eq!(mock.total_fetches(), 4);
}

#[tokio::test]
async fn grid_fails_fast_on_first_error() {
    let mock = MockTiles::new();
    colored_grid(&mock, TileCoord::new(0, 0), 3, 1);
    mock.set_tile(
        TileCoord::new(1, 0),
        MockBehavior::Fail(PixguardError::http("mock.tiles", Some(503), "down")),
    );
    let pipeline = TilePipeline::new(Arc::new(mock), cfg());

    let err = pipeline.fetch_grid(TileCoord::new(0, 0), 3, 1).await.unwrap_err();
    assert!(matches!(err, PixguardError::Http { status: Some(503), .. }));
}

#[tokio::test]
async fn empty_payload_counts_as_failure() {
    let mock = MockTiles::new();
    mock.set_default(MockBehavior::Return(Arc::from(&[][..])));
    let pipeline = TilePipeline::new(Arc::new(mock), cfg());

    let err = pipeline.fetch_grid(TileCoord::new(0, 0), 1, 1).await.unwrap_err();
    assert!(matches!(err, PixguardError::Data(_)));
    let err = pipeline.fetch_grid(TileCoord::new(0, 0), 0, 1).await.unwrap_err();
    assert!(matches!(err, PixguardError::InvalidArg(_)));
}

#[tokio::test(start_paused = true)]
async fn hung_tile_hits_the_request_timeout() {
    let mock = MockTiles::new();
    mock.set_default(MockBehavior::Hang);
    let pipeline = TilePipeline::new(Arc::new(mock), cfg());

    let started = tokio::time::Instant::now();
    let err = pipeline.fetch_tile(TileCoord::new(0, 0)).await.unwrap_err();
    assert!(matches!(err, PixguardError::Timeout { .. }));
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn cached_grid_is_served_without_refetch() {
    let mock = MockTiles::new();
    colored_grid(&mock, TileCoord::new(0, 0), 2, 1);
    let source = TileSourceBuilder::new(Arc::new(mock.clone()))
        .with_cache(Duration::from_secs(120))
        .build();
    let pipeline = TilePipeline::new(source, cfg());

    pipeline.fetch_grid(TileCoord::new(0, 0), 2, 1).await.unwrap();
    pipeline.fetch_grid(TileCoord::new(0, 0), 2, 1).await.unwrap();
    assert_eq!(mock.total_fetches(), 2);

    pipeline.fetch_grid_fresh(TileCoord::new(0, 0), 2, 1).await.unwrap();
    assert_eq!(mock.fresh_fetches(), 2);
}
