//! Builder for composing connectors with middleware layers.
//!
//! # Middleware Ordering Convention
//!
//! Middleware layers form an "onion" around the raw connector:
//!
//! ```text
//! Caller
//!     ↓
//! Outermost Middleware (tile cache / lookup backoff gate)
//!     ↓
//! Inner Middleware (per-host rate limiter)
//!     ↓
//! Call deadline (lookup timeout)
//!     ↓
//! Raw Connector (e.g. wplace HTTP client)
//! ```
//!
//! Cache hits never wait for a rate-limit slot, a lookup waiting on the
//! backoff gate does not occupy a queue slot, and the lookup deadline only
//! covers the upstream call itself. The order is fixed by layer kind,
//! not by the order of builder calls.
//!
//! ## Storage vs Application Order
//!
//! The `layers` vector stores middleware in **outermost-first** order, and they
//! are **applied in reverse** during `build()` to construct the proper nesting.
//!
//! ```text
//! TileSourceBuilder::new(raw).with_cache(ttl).with_rate_limit(limiter, cancel)
//!
//! Storage: [Cache, RateLimited]   (outermost first)
//! Applied: Raw -> RateLimited -> Cache
//! Result:  Cache(RateLimited(Raw))
//! ```

use std::sync::Arc;
use std::time::Duration;

use pixguard_core::{Middleware, PainterLookup, Shutdown, TileSource};
use pixguard_types::BackoffConfig;

use crate::backoff::BackoffMiddleware;
use crate::cache::CacheMiddleware;
use crate::rate_limit::RateLimiter;
use crate::throttle::RateLimitMiddleware;
use crate::timeout::TimeoutMiddleware;

/// Position of a layer kind in the onion; lower is further out.
const RANK_CUSTOM: u8 = 0;
const RANK_GATE: u8 = 1;
const RANK_RATE_LIMIT: u8 = 2;
const RANK_DEADLINE: u8 = 3;

/// Generic middleware builder for composing a connector with layered wrappers.
///
/// See [module-level documentation](self) for details on middleware ordering.
pub struct ConnectorBuilder<C: ?Sized> {
    raw: Arc<C>,
    raw_name: &'static str,
    /// Middleware layers in outermost-first order, tagged with their rank.
    layers: Vec<(u8, Box<dyn Middleware<C>>)>,
}

/// Builder for tile sources.
pub type TileSourceBuilder = ConnectorBuilder<dyn TileSource>;
/// Builder for painter lookups.
pub type LookupBuilder = ConnectorBuilder<dyn PainterLookup>;

impl<C: ?Sized> ConnectorBuilder<C> {
    fn insert_ranked(&mut self, rank: u8, layer: Box<dyn Middleware<C>>) {
        let name = layer.name();
        self.layers.retain(|(_, m)| m.name() != name);
        let at = self
            .layers
            .iter()
            .position(|(r, _)| *r > rank)
            .unwrap_or(self.layers.len());
        self.layers.insert(at, (rank, layer));
    }

    fn remove(&mut self, name: &str) {
        self.layers.retain(|(_, m)| m.name() != name);
    }

    /// Add an arbitrary middleware layer at the outermost position.
    #[must_use]
    pub fn layer(mut self, layer: Box<dyn Middleware<C>>) -> Self {
        self.layers.insert(0, (RANK_CUSTOM, layer));
        self
    }

    /// Layer names in outermost-first order, followed by the raw connector's name.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers
            .iter()
            .map(|(_, m)| m.name())
            .chain(std::iter::once(self.raw_name))
            .collect()
    }

    /// Export each layer's configuration, outermost first.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let layers: Vec<serde_json::Value> = self
            .layers
            .iter()
            .map(|(_, m)| serde_json::json!({ "name": m.name(), "config": m.config_json() }))
            .collect();
        serde_json::json!({ "layers": layers, "raw": self.raw_name })
    }

    /// Build the wrapped connector.
    ///
    /// Applies middleware layers in reverse order (innermost to outermost).
    #[must_use]
    pub fn build(self) -> Arc<C> {
        let mut acc: Arc<C> = Arc::clone(&self.raw);
        for (_, m) in self.layers.into_iter().rev() {
            acc = m.apply(acc);
        }
        acc
    }
}

impl ConnectorBuilder<dyn TileSource> {
    /// Create a new builder from a raw, unwrapped tile source.
    #[must_use]
    pub fn new(raw: Arc<dyn TileSource>) -> Self {
        let raw_name = raw.name();
        Self {
            raw,
            raw_name,
            layers: Vec::new(),
        }
    }

    /// Add or replace per-host pacing.
    #[must_use]
    pub fn with_rate_limit(mut self, limiter: RateLimiter, cancel: Shutdown) -> Self {
        self.insert_ranked(
            RANK_RATE_LIMIT,
            Box::new(RateLimitMiddleware::new(limiter, cancel)),
        );
        self
    }

    /// Remove pacing if present.
    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.remove("RateLimited");
        self
    }

    /// Add or replace the tile cache.
    #[must_use]
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.insert_ranked(RANK_GATE, Box::new(CacheMiddleware::new(ttl)));
        self
    }

    /// Remove the tile cache if present.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.remove("CachedTileSource");
        self
    }
}

impl ConnectorBuilder<dyn PainterLookup> {
    /// Create a new builder from a raw, unwrapped painter lookup.
    #[must_use]
    pub fn new(raw: Arc<dyn PainterLookup>) -> Self {
        let raw_name = raw.name();
        Self {
            raw,
            raw_name,
            layers: Vec::new(),
        }
    }

    /// Add or replace per-host pacing.
    #[must_use]
    pub fn with_rate_limit(mut self, limiter: RateLimiter, cancel: Shutdown) -> Self {
        self.insert_ranked(
            RANK_RATE_LIMIT,
            Box::new(RateLimitMiddleware::new(limiter, cancel)),
        );
        self
    }

    /// Remove pacing if present.
    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.remove("RateLimited");
        self
    }

    /// Add or replace the backoff gate.
    #[must_use]
    pub fn with_backoff(mut self, cfg: BackoffConfig, cancel: Shutdown) -> Self {
        self.insert_ranked(RANK_GATE, Box::new(BackoffMiddleware::new(cfg, cancel)));
        self
    }

    /// Remove the backoff gate if present.
    #[must_use]
    pub fn without_backoff(mut self) -> Self {
        self.remove("BackoffLookup");
        self
    }

    /// Add or replace the per-call deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.insert_ranked(RANK_DEADLINE, Box::new(TimeoutMiddleware::new(timeout)));
        self
    }

    /// Remove the per-call deadline if present.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.remove("TimeoutLookup");
        self
    }
}
