use std::time::Duration;

use chrono::{TimeZone, Utc};
use pixguard_core::{
    Clock, PainterLookup, PixelCoordinate, PixguardError, TileCoord, TileSource,
};
use pixguard_mock::{
    ManualClock, MockBehavior, MockLookup, MockTiles, mask_png, painter, solid_tile_png,
};

#[tokio::test]
async fn tiles_follow_rules_and_count_fetches() {
    let mock = MockTiles::new();
    let tile = TileCoord::new(3, 4);
    let png = solid_tile_png(4, [1, 2, 3, 255]);
    mock.set_tile(tile, MockBehavior::Return(png.clone()));

    let got = mock.fetch_tile(tile).await.expect("tile ok");
    assert_eq!(got, png);
    let _ = mock.fetch_tile_fresh(tile).await.expect("fresh ok");
    assert_eq!(mock.fetch_count(tile), 2);
    assert_eq!(mock.fresh_fetches(), 1);
    assert_eq!(mock.host(), "mock.tiles");
}

#[tokio::test]
async fn tile_without_rule_is_not_found() {
    let mock = MockTiles::new();
    let err = mock
        .fetch_tile(TileCoord::new(0, 0))
        .await
        .expect_err("no rule");
    assert!(matches!(err, PixguardError::NotFound { .. }));

    mock.set_default(MockBehavior::Fail(PixguardError::rate_limited("mock.tiles")));
    let err = mock
        .fetch_tile(TileCoord::new(0, 0))
        .await
        .expect_err("default fail");
    assert!(err.is_rate_limited());
    assert_eq!(mock.total_fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_tile_never_resolves() {
    let mock = MockTiles::new();
    mock.set_default(MockBehavior::Hang);
    let out = tokio::time::timeout(Duration::from_secs(5), mock.fetch_tile(TileCoord::new(1, 1))).await;
    assert!(out.is_err());
}

#[tokio::test]
async fn lookup_consumes_script_before_rule() {
    let mock = MockLookup::new();
    let px = PixelCoordinate::new(10, 20);
    mock.set_painter(px, painter(7, "alice"));
    mock.push_script(px, MockBehavior::Fail(PixguardError::rate_limited("mock.pixels")));

    let first = mock.lookup(px).await.expect_err("scripted failure");
    assert!(first.is_rate_limited());
    let second = mock.lookup(px).await.expect("rule").expect("painter");
    assert_eq!(second.id, 7);
    assert_eq!(second.name, "alice");

    let other = mock.lookup(PixelCoordinate::new(0, 0)).await.expect("default");
    assert!(other.is_none());
    assert_eq!(mock.calls(), vec![px, px, PixelCoordinate::new(0, 0)]);
    assert_eq!(mock.call_count(), 3);
}

#[test]
fn manual_clock_moves_only_when_told() {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 14, 59, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.utc_now(), start);
    clock.advance(Duration::from_secs(60));
    assert_eq!(clock.utc_now(), start + chrono::Duration::seconds(60));
    let later = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
    clock.set(later);
    assert_eq!(clock.utc_now(), later);
}

#[test]
fn png_helpers_decode() {
    let img = image::load_from_memory(&solid_tile_png(3, [9, 8, 7, 255]))
        .expect("decode")
        .to_rgba8();
    assert_eq!(img.dimensions(), (3, 3));
    assert_eq!(img.get_pixel(2, 2).0, [9, 8, 7, 255]);

    let mask = image::load_from_memory(&mask_png(4, 2, &[(1, 1), (9, 9)]))
        .expect("decode")
        .to_rgba8();
    assert_eq!(mask.get_pixel(1, 1).0[3], 255);
    assert_eq!(mask.get_pixel(0, 0).0[3], 0);
}

#[tokio::test(start_paused = true)]
async fn delayed_behavior_answers_after_the_wait() {
    let mock = MockLookup::new();
    let px = PixelCoordinate::new(9, 9);
    mock.set_behavior(
        px,
        MockBehavior::Delayed(Duration::from_secs(3), Some(painter(5, "eve"))),
    );

    let started = tokio::time::Instant::now();
    let got = mock.lookup(px).await.unwrap().unwrap();
    assert_eq!(got.id, 5);
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}
