//! On-disk document shapes written by the tracker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pixel::PixelCoordinate;

/// File name of the actor-record document.
pub const ACTORS_FILE: &str = "user_activity.json";
/// File name of the vandalized-pixel index document.
pub const VANDAL_INDEX_FILE: &str = "vandalized_pixels.json";
/// File name of the daily aggregate counts document.
pub const DAILY_TOTALS_FILE: &str = "daily_totals.json";

/// Persisted form of the vandalized-pixel index.
///
/// `vandalized_pixels` lists every pixel in the latest diff snapshot as `[x, y]`
/// pairs; `pixel_to_painter` maps the canonical `"(x, y)"` key of attributed
/// pixels to the responsible actor id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VandalIndexDocument {
    /// Pixels of the latest snapshot.
    #[serde(default)]
    pub vandalized_pixels: Vec<[u32; 2]>,
    /// Attributed pixels keyed by canonical pixel key.
    #[serde(default)]
    pub pixel_to_painter: BTreeMap<String, String>,
}

impl VandalIndexDocument {
    /// Iterate the snapshot pixels as coordinates.
    pub fn pixels(&self) -> impl Iterator<Item = PixelCoordinate> + '_ {
        self.vandalized_pixels
            .iter()
            .map(|[x, y]| PixelCoordinate::new(*x, *y))
    }

    /// Decode the attribution map, skipping keys that do not parse.
    #[must_use]
    pub fn attributions(&self) -> BTreeMap<PixelCoordinate, String> {
        self.pixel_to_painter
            .iter()
            .filter_map(|(k, v)| PixelCoordinate::parse_key(k).map(|px| (px, v.clone())))
            .collect()
    }
}

/// Date-keyed totals of newly vandalized and newly restored pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotals {
    /// Pixels that entered the diff, by date.
    #[serde(default)]
    pub vandalized: BTreeMap<String, u64>,
    /// Pixels that left the diff, by date.
    #[serde(default)]
    pub restored: BTreeMap<String, u64>,
}

impl DailyTotals {
    /// Add `vandalized` and `restored` transitions to `date`.
    pub fn add(&mut self, date: &str, vandalized: u64, restored: u64) {
        if vandalized > 0 {
            *self.vandalized.entry(date.to_owned()).or_default() += vandalized;
        }
        if restored > 0 {
            *self.restored.entry(date.to_owned()).or_default() += restored;
        }
    }

    /// Totals for one date as `(vandalized, restored)`.
    #[must_use]
    pub fn on(&self, date: &str) -> (u64, u64) {
        (
            self.vandalized.get(date).copied().unwrap_or(0),
            self.restored.get(date).copied().unwrap_or(0),
        )
    }
}
