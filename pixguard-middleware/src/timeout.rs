//! Per-call deadline for painter lookups.
//!
//! Sits innermost, directly around the raw connector, so time spent waiting on
//! the backoff gate or in the limiter queue never counts against the deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pixguard_core::{Middleware, PainterLookup};
use pixguard_types::{PainterInfo, PixelCoordinate, PixguardError};

/// Painter lookup whose upstream calls fail with `Timeout` after a fixed duration.
pub struct TimeoutLookup {
    inner: Arc<dyn PainterLookup>,
    timeout: Duration,
}

impl TimeoutLookup {
    /// Bound every call on `inner` by `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn PainterLookup>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl PainterLookup for TimeoutLookup {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn lookup(&self, pixel: PixelCoordinate) -> Result<Option<PainterInfo>, PixguardError> {
        match tokio::time::timeout(self.timeout, self.inner.lookup(pixel)).await {
            Ok(out) => out,
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    pixel = %pixel,
                    host = self.inner.host(),
                    timeout_ms = self.timeout.as_millis(),
                    "painter lookup timed out"
                );
                Err(PixguardError::timeout(format!("painter lookup at {pixel}")))
            }
        }
    }
}

/// Middleware config for constructing a [`TimeoutLookup`].
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Bound each upstream call by `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Middleware<dyn PainterLookup> for TimeoutMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn PainterLookup>) -> Arc<dyn PainterLookup> {
        Arc::new(TimeoutLookup::new(inner, self.timeout))
    }

    fn name(&self) -> &'static str {
        "TimeoutLookup"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "timeout_ms": u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
