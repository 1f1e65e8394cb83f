use std::sync::Arc;
use std::time::Duration;

use pixguard_core::{TileBytes, TileSource};
use pixguard_middleware::CachedTileSource;
use pixguard_mock::{MockBehavior, MockTiles, solid_tile_png};
use pixguard_types::TileCoord;

fn cached(mock: &MockTiles, ttl: Duration) -> CachedTileSource {
    CachedTileSource::new(Arc::new(mock.clone()), ttl, 16)
}

#[tokio::test(start_paused = true)]
async fn hit_within_ttl_and_refetch_after_expiry() {
    let mock = MockTiles::new();
    let tile = TileCoord::new(1755, 55);
    mock.set_tile(tile, MockBehavior::Return(solid_tile_png(2, [0, 0, 0, 255])));
    let cache = cached(&mock, Duration::from_secs(120));

    cache.fetch_tile(tile).await.unwrap();
    tokio::time::advance(Duration::from_secs(119)).await;
    cache.fetch_tile(tile).await.unwrap();
    assert_eq!(mock.fetch_count(tile), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    cache.fetch_tile(tile).await.unwrap();
    assert_eq!(mock.fetch_count(tile), 2);
}

#[tokio::test]
async fn empty_payloads_are_not_cached() {
    let mock = MockTiles::new();
    let tile = TileCoord::new(0, 0);
    let empty: TileBytes = Arc::from(Vec::new());
    mock.set_tile(tile, MockBehavior::Return(empty));
    let cache = cached(&mock, Duration::from_secs(120));

    assert!(cache.fetch_tile(tile).await.unwrap().is_empty());
    assert!(cache.fetch_tile(tile).await.unwrap().is_empty());
    assert_eq!(mock.fetch_count(tile), 2);
}

#[tokio::test]
async fn errors_are_not_cached() {
    let mock = MockTiles::new();
    let tile = TileCoord::new(5, 5);
    let cache = cached(&mock, Duration::from_secs(120));

    assert!(cache.fetch_tile(tile).await.is_err());
    mock.set_tile(tile, MockBehavior::Return(solid_tile_png(1, [1, 1, 1, 255])));
    assert!(cache.fetch_tile(tile).await.is_ok());
    assert_eq!(mock.fetch_count(tile), 2);
}

#[tokio::test]
async fn fresh_fetch_bypasses_cache() {
    let mock = MockTiles::new();
    let tile = TileCoord::new(2, 3);
    mock.set_tile(tile, MockBehavior::Return(solid_tile_png(1, [4, 4, 4, 255])));
    let cache = cached(&mock, Duration::from_secs(120));

    cache.fetch_tile(tile).await.unwrap();
    cache.fetch_tile_fresh(tile).await.unwrap();
    cache.fetch_tile(tile).await.unwrap();
    assert_eq!(mock.fetch_count(tile), 2);
    assert_eq!(mock.fresh_fetches(), 1);
}

#[tokio::test]
async fn invalidate_all_forces_refetch() {
    let mock = MockTiles::new();
    let tile = TileCoord::new(9, 9);
    mock.set_tile(tile, MockBehavior::Return(solid_tile_png(1, [4, 4, 4, 255])));
    let cache = cached(&mock, Duration::from_secs(120));

    cache.fetch_tile(tile).await.unwrap();
    cache.invalidate_all();
    cache.fetch_tile(tile).await.unwrap();
    assert_eq!(mock.fetch_count(tile), 2);
}
