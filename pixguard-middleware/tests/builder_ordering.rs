use std::sync::Arc;
use std::time::Duration;

use pixguard_core::{Middleware, PainterLookup, Shutdown, TileSource};
use pixguard_middleware::{LookupBuilder, RateLimiter, TileSourceBuilder};
use pixguard_mock::{MockBehavior, MockLookup, MockTiles, solid_tile_png};
use pixguard_types::{BackoffConfig, RateLimitConfig, TileCoord};

struct Tag;

impl Middleware<dyn TileSource> for Tag {
    fn apply(self: Box<Self>, inner: Arc<dyn TileSource>) -> Arc<dyn TileSource> {
        inner
    }

    fn name(&self) -> &'static str {
        "Tag"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

#[test]
fn tile_layers_are_ordered_by_kind_not_call_order() {
    let limiter = RateLimiter::new(RateLimitConfig::default());
    let builder = TileSourceBuilder::new(Arc::new(MockTiles::new()))
        .with_rate_limit(limiter, Shutdown::never())
        .with_cache(Duration::from_secs(120))
        .layer(Box::new(Tag));
    assert_eq!(
        builder.layer_names(),
        vec!["Tag", "CachedTileSource", "RateLimited", "pixguard-mock"]
    );

    let json = builder.to_json();
    assert_eq!(json["raw"], "pixguard-mock");
    assert_eq!(json["layers"][1]["config"]["ttl_ms"], 120_000);
    assert_eq!(json["layers"][2]["config"]["requests_per_second"], 3);
}

#[test]
fn re_adding_a_layer_replaces_it() {
    let builder = LookupBuilder::new(Arc::new(MockLookup::new()))
        .with_backoff(BackoffConfig::default(), Shutdown::never())
        .with_rate_limit(RateLimiter::new(RateLimitConfig::lookups()), Shutdown::never())
        .with_backoff(BackoffConfig::default(), Shutdown::never());
    assert_eq!(
        builder.layer_names(),
        vec!["BackoffLookup", "RateLimited", "pixguard-mock"]
    );

    let builder = builder.without_backoff().without_rate_limit();
    assert_eq!(builder.layer_names(), vec!["pixguard-mock"]);
}

#[tokio::test(start_paused = true)]
async fn cache_hits_skip_the_rate_limiter() {
    let mock = MockTiles::new();
    let tile = TileCoord::new(1, 2);
    mock.set_tile(tile, MockBehavior::Return(solid_tile_png(1, [0, 0, 0, 255])));
    let limiter = RateLimiter::new(RateLimitConfig {
        requests_per_second: 1,
        queue_capacity: 4,
    });
    let source = TileSourceBuilder::new(Arc::new(mock.clone()))
        .with_rate_limit(limiter, Shutdown::never())
        .with_cache(Duration::from_secs(120))
        .build();

    let start = tokio::time::Instant::now();
    for _ in 0..5 {
        source.fetch_tile(tile).await.unwrap();
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(mock.fetch_count(tile), 1);
    assert_eq!(source.host(), "mock.tiles");
}

#[tokio::test]
async fn built_lookup_forwards_identity() {
    let lookup = LookupBuilder::new(Arc::new(MockLookup::new()))
        .with_backoff(BackoffConfig::default(), Shutdown::never())
        .build();
    assert_eq!(lookup.name(), "pixguard-mock");
    assert_eq!(lookup.host(), "mock.pixels");
}
