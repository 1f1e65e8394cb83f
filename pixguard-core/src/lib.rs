//! pixguard-core
//!
//! Seams and runtime primitives shared across the pixguard workspace.
//!
//! - `connector`: the `TileSource` and `PainterLookup` traits implemented by
//!   upstream connectors, mocks and middleware wrappers.
//! - `middleware`: the `Middleware` trait used to stack wrappers around a connector.
//! - `backoff`: the pure exponential-backoff value object.
//! - `slot`: the latest-wins single-slot queue used for diff ingress.
//! - `shutdown`: the shared cancellation signal and worker groups.
//! - `atomic`: crash-safe JSON document writes.
//!
//! Async runtime (Tokio)
//! ---------------------
//! `Shutdown`, `WorkerGroup` and `Clock` are built on Tokio types; code using
//! them must run under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Crash-safe document writes.
pub mod atomic;
/// Backoff state for rate-limited upstreams.
pub mod backoff;
/// Injectable time source.
pub mod clock;
/// Connector traits.
pub mod connector;
/// Middleware trait implemented by connector wrappers.
pub mod middleware;
/// Cancellation and worker lifecycle.
pub mod shutdown;
/// Latest-wins single-slot queue.
pub mod slot;

pub use atomic::{StagedWrite, read_json, write_atomic, write_json_atomic};
pub use backoff::Backoff;
pub use clock::{Clock, SystemClock};
pub use connector::{PainterLookup, TileBytes, TileSource};
pub use middleware::Middleware;
pub use shutdown::{Shutdown, ShutdownSignal, WorkerGroup};
pub use slot::LatestSlot;

pub use pixguard_types::*;
