//! Deterministic in-memory connectors for tests and demos.
//!
//! - [`MockTiles`] serves tile payloads from per-tile rules and counts fetches.
//! - [`MockLookup`] answers painter lookups from per-pixel rules and scripts.
//! - [`ManualClock`] pins the wall clock for date-bucket assertions.

mod clock;
mod dynamic;
mod png;

pub use clock::ManualClock;
pub use dynamic::{MockBehavior, MockLookup, MockTiles, painter};
pub use png::{encode_png, mask_png, solid_tile_png};
