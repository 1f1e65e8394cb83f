use std::sync::Arc;
use std::time::Duration;

use pixguard_core::{PainterLookup, Shutdown};
use pixguard_middleware::{LookupBuilder, RateLimiter, TimeoutLookup};
use pixguard_mock::{MockBehavior, MockLookup, painter};
use pixguard_types::{BackoffConfig, PixelCoordinate, PixguardError, RateLimitConfig};

#[tokio::test(start_paused = true)]
async fn hung_call_fails_with_timeout() {
    let mock = MockLookup::new();
    let px = PixelCoordinate::new(4, 4);
    mock.set_behavior(px, MockBehavior::Hang);
    let bounded = TimeoutLookup::new(Arc::new(mock), Duration::from_secs(8));

    let started = tokio::time::Instant::now();
    let err = bounded.lookup(px).await.unwrap_err();
    assert!(matches!(err, PixguardError::Timeout { .. }));
    assert_eq!(started.elapsed(), Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn slow_call_within_deadline_succeeds() {
    let mock = MockLookup::new();
    let px = PixelCoordinate::new(4, 4);
    mock.set_behavior(
        px,
        MockBehavior::Delayed(Duration::from_secs(5), Some(painter(1, "a"))),
    );
    let bounded = TimeoutLookup::new(Arc::new(mock), Duration::from_secs(8));
    assert_eq!(bounded.lookup(px).await.unwrap().unwrap().id, 1);
}

#[test]
fn deadline_sits_innermost() {
    let builder = LookupBuilder::new(Arc::new(MockLookup::new()))
        .with_timeout(Duration::from_secs(8))
        .with_backoff(BackoffConfig::default(), Shutdown::never())
        .with_rate_limit(RateLimiter::new(RateLimitConfig::lookups()), Shutdown::never());
    assert_eq!(
        builder.layer_names(),
        vec!["BackoffLookup", "RateLimited", "TimeoutLookup", "pixguard-mock"]
    );
    assert_eq!(builder.to_json()["layers"][2]["config"]["timeout_ms"], 8_000);
    assert_eq!(builder.without_timeout().layer_names().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn backoff_wait_does_not_count_against_the_deadline() {
    let mock = MockLookup::new();
    let a = PixelCoordinate::new(1, 1);
    let b = PixelCoordinate::new(2, 2);
    mock.push_script(a, MockBehavior::Fail(PixguardError::rate_limited("mock.pixels")));
    mock.set_painter(b, painter(7, "mallory"));
    let lookup = LookupBuilder::new(Arc::new(mock.clone()))
        .with_backoff(
            BackoffConfig {
                min_backoff_ms: 16_000,
                max_backoff_ms: 30_000,
                factor: 2,
            },
            Shutdown::never(),
        )
        .with_timeout(Duration::from_secs(8))
        .build();

    assert!(lookup.lookup(a).await.unwrap_err().is_rate_limited());
    let started = tokio::time::Instant::now();
    let found = lookup.lookup(b).await.unwrap().unwrap();
    assert_eq!(found.id, 7);
    assert!(started.elapsed() >= Duration::from_secs(16));
    assert_eq!(mock.call_count(), 2);
}
