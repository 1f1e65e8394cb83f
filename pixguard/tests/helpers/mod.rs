// Re-export helpers so tests can `use helpers::*;`
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixguard::{
    NotifySettings, PixelCoordinate, RegionOrigin, TierEvent, TierSink, TrackerConfig,
};
pub use pixguard_mock::{ManualClock, MockBehavior, MockLookup, MockTiles, painter};

/// Date key of [`start_time`] in the default (Asia/Tokyo) reporting zone.
pub const DAY: &str = "2025-03-01";

/// 12:00 in Tokyo on [`DAY`].
pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-01T03:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub const fn px(x: u32, y: u32) -> PixelCoordinate {
    PixelCoordinate::new(x, y)
}

/// Tracker config rooted at the canvas origin so diff pixels keep their coordinates.
pub fn tracker_cfg(dir: &Path) -> TrackerConfig {
    TrackerConfig {
        origin: RegionOrigin {
            tile_x: 0,
            tile_y: 0,
            pixel_x: 0,
            pixel_y: 0,
        },
        width: 16,
        height: 16,
        data_dir: dir.to_path_buf(),
        ..TrackerConfig::default()
    }
}

/// Notify settings with no debounce.
pub fn immediate(threshold: f64) -> NotifySettings {
    NotifySettings {
        delay: Duration::ZERO,
        threshold,
        ..NotifySettings::default()
    }
}

pub type EventLog = Arc<Mutex<Vec<(String, TierEvent)>>>;

/// Sink that appends every event to a shared log.
pub fn recording_sink() -> (Arc<dyn TierSink>, EventLog) {
    let log: EventLog = Arc::default();
    let writer = Arc::clone(&log);
    let sink: Arc<dyn TierSink> = Arc::new(move |target: &str, event: TierEvent| {
        writer.lock().unwrap().push((target.to_owned(), event));
    });
    (sink, log)
}

pub fn escalations(log: &EventLog) -> Vec<(String, pixguard::Tier, bool)> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|(t, e)| match e {
            TierEvent::Escalated { tier, mention, .. } => Some((t.clone(), *tier, *mention)),
            _ => None,
        })
        .collect()
}

pub fn count(log: &EventLog, pred: impl Fn(&TierEvent) -> bool) -> usize {
    log.lock().unwrap().iter().filter(|(_, e)| pred(e)).count()
}
