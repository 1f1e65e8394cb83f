//! pixguard-wplace
//!
//! Connectors for the public wplace backend:
//!
//! - [`WplaceTiles`] downloads tile PNGs from `/files/s0/tiles/{x}/{y}.png`.
//! - [`WplacePixels`] asks `/s0/pixel/{tx}/{ty}?x=&y=` who painted a pixel.
//!
//! Both report the base URL's host as their rate-limit key and map HTTP 429 to
//! `PixguardError::RateLimited`. They do no pacing of their own; wrap them with
//! `pixguard-middleware` builders for that.
#![warn(missing_docs)]

mod http;
mod pixels;
mod tiles;

pub use pixels::WplacePixels;
pub use tiles::WplaceTiles;

/// Production backend base URL.
pub const DEFAULT_BASE_URL: &str = "https://backend.wplace.live";
