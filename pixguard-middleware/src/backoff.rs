//! Backoff gate for painter lookups.
//!
//! When the upstream answers "too many requests", every subsequent lookup waits
//! until the shared retry gate has passed before calling out. The delay grows
//! with each consecutive signal and drops back to the floor on success.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use pixguard_core::{Backoff, Middleware, PainterLookup, Shutdown};
use pixguard_types::{BackoffConfig, PainterInfo, PixelCoordinate, PixguardError};
use tokio::time::Instant;

/// Painter lookup guarded by a shared [`Backoff`].
pub struct BackoffLookup {
    inner: Arc<dyn PainterLookup>,
    state: Mutex<Backoff>,
    cancel: Shutdown,
}

impl BackoffLookup {
    /// Wrap `inner`; waiting on the gate ends early with `Cancelled` once `cancel` fires.
    pub fn new(inner: Arc<dyn PainterLookup>, cfg: BackoffConfig, cancel: Shutdown) -> Self {
        Self {
            inner,
            state: Mutex::new(Backoff::new(cfg)),
            cancel,
        }
    }

    /// Copy of the current backoff state.
    #[must_use]
    pub fn snapshot(&self) -> Backoff {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut Backoff) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

#[async_trait]
impl PainterLookup for BackoffLookup {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn lookup(&self, pixel: PixelCoordinate) -> Result<Option<PainterInfo>, PixguardError> {
        if let Some(wait) = self.with_state(|b| b.wait_for(Instant::now())) {
            #[cfg(feature = "tracing")]
            tracing::debug!(pixel = %pixel, wait_ms = wait.as_millis(), "waiting for lookup backoff");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(PixguardError::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }

        match self.inner.lookup(pixel).await {
            Ok(found) => {
                self.with_state(Backoff::on_success);
                Ok(found)
            }
            Err(err) if err.is_rate_limited() => {
                let _gate = self.with_state(|b| b.on_rate_limited(Instant::now()));
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    host = self.inner.host(),
                    retry_in_ms = (_gate - Instant::now()).as_millis(),
                    "lookup rate limited; backing off"
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

/// Middleware config for constructing a [`BackoffLookup`].
pub struct BackoffMiddleware {
    cfg: BackoffConfig,
    cancel: Shutdown,
}

impl BackoffMiddleware {
    /// Gate lookups with `cfg`.
    #[must_use]
    pub const fn new(cfg: BackoffConfig, cancel: Shutdown) -> Self {
        Self { cfg, cancel }
    }
}

impl Middleware<dyn PainterLookup> for BackoffMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn PainterLookup>) -> Arc<dyn PainterLookup> {
        Arc::new(BackoffLookup::new(inner, self.cfg, self.cancel))
    }

    fn name(&self) -> &'static str {
        "BackoffLookup"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "min_backoff_ms": self.cfg.min_backoff_ms,
            "max_backoff_ms": self.cfg.max_backoff_ms,
            "factor": self.cfg.factor,
        })
    }
}
