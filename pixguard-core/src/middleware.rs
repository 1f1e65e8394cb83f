//! Middleware trait for wrapping connector implementations.

use std::sync::Arc;

/// Trait implemented by connector middleware layers.
///
/// `C` is the connector trait object being wrapped (`dyn TileSource` or
/// `dyn PainterLookup`). A middleware consumes an inner connector and returns a
/// wrapped connector that augments its behavior (pacing, caching, backoff).
pub trait Middleware<C: ?Sized>: Send + Sync {
    /// Apply this middleware to wrap an inner connector and return the wrapped connector.
    fn apply(self: Box<Self>, inner: Arc<C>) -> Arc<C>;

    /// Human-readable middleware name for introspection/logging.
    fn name(&self) -> &'static str;

    /// Opaque configuration snapshot for serialization/inspection.
    fn config_json(&self) -> serde_json::Value;
}
