mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use pixguard::{
    Acquire, LinkConfig, LinkOutcome, LinkSessions, PixguardError, Shutdown, ShutdownSignal,
    TILE_SIZE, TileCoord, poll_link,
};

fn sessions(max: usize) -> LinkSessions {
    LinkSessions::new(
        LinkConfig {
            max_sessions: max,
            ..LinkConfig::default()
        },
        clock(),
    )
}

fn started(a: Acquire) -> pixguard::LinkSession {
    match a {
        Acquire::Started(s) => s,
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn acquire_hands_out_unique_pixels_inside_the_margin() {
    let reg = sessions(20);
    let mut seen = std::collections::HashSet::new();
    for i in 0..20 {
        let s = started(reg.acquire(&format!("user{i}")));
        assert_eq!(s.pixel.tile(), TileCoord::new(1755, 55));
        let (x, y) = s.pixel.in_tile();
        assert!((2..=TILE_SIZE - 3).contains(&x));
        assert!((2..=TILE_SIZE - 3).contains(&y));
        assert!(seen.insert(s.pixel));
    }
    assert_eq!(reg.active(), 20);
    assert_eq!(reg.acquire("late"), Acquire::Busy);
}

#[tokio::test(start_paused = true)]
async fn existing_session_reports_time_left_and_expires() {
    let reg = sessions(1);
    let first = started(reg.acquire("alice"));

    tokio::time::advance(Duration::from_secs(15)).await;
    match reg.acquire("alice") {
        Acquire::Existing { session, remaining } => {
            assert_eq!(session, first);
            assert_eq!(remaining, Duration::from_secs(45));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(reg.acquire("bob"), Acquire::Busy);

    tokio::time::advance(Duration::from_secs(46)).await;
    assert_eq!(reg.active(), 0);
    let bob = started(reg.acquire("bob"));
    assert_eq!(bob.user, "bob");
    assert!(reg.release("bob"));
    assert!(!reg.release("bob"));
}

#[tokio::test(start_paused = true)]
async fn poll_links_when_painter_changes() {
    let reg = sessions(5);
    let session = started(reg.acquire("carol"));
    let lookup = MockLookup::new();
    lookup.push_script(session.pixel, MockBehavior::Return(Some(painter(1, "previous"))));
    lookup.push_script(session.pixel, MockBehavior::Return(Some(painter(1, "previous"))));
    lookup.push_script(
        session.pixel,
        MockBehavior::Fail(PixguardError::rate_limited("mock.pixels")),
    );
    lookup.set_painter(session.pixel, painter(2, "carol-painter"));

    let started_at = tokio::time::Instant::now();
    let outcome = poll_link(&lookup, &session, Duration::from_secs(10), &Shutdown::never())
        .await
        .unwrap();
    assert_eq!(outcome, LinkOutcome::Linked(painter(2, "carol-painter")));
    assert_eq!(started_at.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn poll_times_out_with_the_session() {
    let reg = sessions(5);
    let session = started(reg.acquire("dave"));
    let lookup = MockLookup::new();
    lookup.set_painter(session.pixel, painter(1, "same"));

    let outcome = poll_link(&lookup, &session, Duration::from_secs(10), &Shutdown::never())
        .await
        .unwrap();
    assert_eq!(outcome, LinkOutcome::TimedOut);
    assert_eq!(lookup.call_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn poll_surfaces_initial_error_and_cancellation() {
    let reg = sessions(5);
    let session = started(reg.acquire("erin"));
    let lookup = MockLookup::new();
    lookup.push_script(
        session.pixel,
        MockBehavior::Fail(PixguardError::http("mock.pixels", Some(500), "x")),
    );
    let err = poll_link(&lookup, &session, Duration::from_secs(10), &Shutdown::never())
        .await
        .unwrap_err();
    assert!(matches!(err, PixguardError::Http { .. }));

    let signal = ShutdownSignal::new();
    let cancel = signal.subscribe();
    let lookup = Arc::new(lookup);
    let task = {
        let lookup = Arc::clone(&lookup);
        let session = session.clone();
        tokio::spawn(async move {
            poll_link(lookup.as_ref(), &session, Duration::from_secs(10), &cancel).await
        })
    };
    tokio::time::sleep(Duration::from_secs(5)).await;
    signal.trigger();
    assert_eq!(task.await.unwrap(), Err(PixguardError::Cancelled));
}
