use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use pixguard_core::{
    PainterInfo, PainterLookup, PixelCoordinate, PixguardError, TileBytes, TileCoord, TileSource,
};
use tokio::time::Instant;

/// Instruction for how a call should behave for a given input.
#[derive(Debug, Clone)]
pub enum MockBehavior<T> {
    /// Return the provided value immediately.
    Return(T),
    /// Fail immediately with the provided error.
    Fail(PixguardError),
    /// Hang indefinitely (simulate a timeout).
    Hang,
    /// Return the provided value after sleeping (simulate a slow upstream).
    Delayed(Duration, T),
}

impl<T> MockBehavior<T> {
    async fn run(self) -> Result<T, PixguardError> {
        match self {
            Self::Return(v) => Ok(v),
            Self::Fail(e) => Err(e),
            Self::Delayed(wait, v) => {
                tokio::time::sleep(wait).await;
                Ok(v)
            }
            Self::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct TileState {
    rules: HashMap<TileCoord, MockBehavior<TileBytes>>,
    default: Option<MockBehavior<TileBytes>>,
    fetches: HashMap<TileCoord, usize>,
    fresh_fetches: usize,
}

/// In-memory tile source driven by per-tile rules.
///
/// Tiles without a rule use the default behavior, or fail with `NotFound` when
/// no default is set. Clones share rules and counters.
#[derive(Clone)]
pub struct MockTiles {
    host: String,
    state: Arc<Mutex<TileState>>,
}

impl Default for MockTiles {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTiles {
    /// Mock answering for host `mock.tiles`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_host("mock.tiles")
    }

    /// Mock answering for a custom host key.
    #[must_use]
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Arc::new(Mutex::new(TileState::default())),
        }
    }

    /// Set the behavior for one tile.
    pub fn set_tile(&self, tile: TileCoord, behavior: MockBehavior<TileBytes>) {
        lock(&self.state).rules.insert(tile, behavior);
    }

    /// Set the behavior for tiles without their own rule.
    pub fn set_default(&self, behavior: MockBehavior<TileBytes>) {
        lock(&self.state).default = Some(behavior);
    }

    /// Number of upstream fetches seen for `tile` (cached or fresh).
    #[must_use]
    pub fn fetch_count(&self, tile: TileCoord) -> usize {
        lock(&self.state).fetches.get(&tile).copied().unwrap_or(0)
    }

    /// Number of upstream fetches across all tiles.
    #[must_use]
    pub fn total_fetches(&self) -> usize {
        lock(&self.state).fetches.values().sum()
    }

    /// Number of fetches that came through `fetch_tile_fresh`.
    #[must_use]
    pub fn fresh_fetches(&self) -> usize {
        lock(&self.state).fresh_fetches
    }

    fn behavior_for(&self, tile: TileCoord, fresh: bool) -> MockBehavior<TileBytes> {
        let mut st = lock(&self.state);
        *st.fetches.entry(tile).or_default() += 1;
        if fresh {
            st.fresh_fetches += 1;
        }
        st.rules
            .get(&tile)
            .or(st.default.as_ref())
            .cloned()
            .unwrap_or_else(|| MockBehavior::Fail(PixguardError::not_found(format!("tile {tile}"))))
    }
}

#[async_trait]
impl TileSource for MockTiles {
    fn name(&self) -> &'static str {
        "pixguard-mock"
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch_tile(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        self.behavior_for(tile, false).run().await
    }

    async fn fetch_tile_fresh(&self, tile: TileCoord) -> Result<TileBytes, PixguardError> {
        self.behavior_for(tile, true).run().await
    }
}

type LookupResult = Option<PainterInfo>;

struct LookupState {
    scripted: HashMap<PixelCoordinate, VecDeque<MockBehavior<LookupResult>>>,
    rules: HashMap<PixelCoordinate, MockBehavior<LookupResult>>,
    default: MockBehavior<LookupResult>,
    calls: Vec<(PixelCoordinate, Instant)>,
}

/// In-memory painter lookup driven by per-pixel rules.
///
/// Each call first consumes the pixel's scripted queue, then falls back to the
/// pixel's rule, then to the default (no painter). Clones share state.
#[derive(Clone)]
pub struct MockLookup {
    host: String,
    state: Arc<Mutex<LookupState>>,
}

impl Default for MockLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLookup {
    /// Mock answering for host `mock.pixels`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_host("mock.pixels")
    }

    /// Mock answering for a custom host key.
    #[must_use]
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Arc::new(Mutex::new(LookupState {
                scripted: HashMap::new(),
                rules: HashMap::new(),
                default: MockBehavior::Return(None),
                calls: Vec::new(),
            })),
        }
    }

    /// Report `painter` for `pixel` until changed.
    pub fn set_painter(&self, pixel: PixelCoordinate, painter: PainterInfo) {
        self.set_behavior(pixel, MockBehavior::Return(Some(painter)));
    }

    /// Set the standing behavior for one pixel.
    pub fn set_behavior(&self, pixel: PixelCoordinate, behavior: MockBehavior<LookupResult>) {
        lock(&self.state).rules.insert(pixel, behavior);
    }

    /// Queue a one-shot behavior for the next call on `pixel`.
    pub fn push_script(&self, pixel: PixelCoordinate, behavior: MockBehavior<LookupResult>) {
        lock(&self.state)
            .scripted
            .entry(pixel)
            .or_default()
            .push_back(behavior);
    }

    /// Set the behavior for pixels without a rule.
    pub fn set_default(&self, behavior: MockBehavior<LookupResult>) {
        lock(&self.state).default = behavior;
    }

    /// Pixels looked up so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<PixelCoordinate> {
        lock(&self.state).calls.iter().map(|(p, _)| *p).collect()
    }

    /// Instants at which calls arrived, in call order.
    #[must_use]
    pub fn call_times(&self) -> Vec<Instant> {
        lock(&self.state).calls.iter().map(|(_, t)| *t).collect()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }
}

#[async_trait]
impl PainterLookup for MockLookup {
    fn name(&self) -> &'static str {
        "pixguard-mock"
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn lookup(&self, pixel: PixelCoordinate) -> Result<LookupResult, PixguardError> {
        let behavior = {
            let mut st = lock(&self.state);
            st.calls.push((pixel, Instant::now()));
            let scripted = st.scripted.get_mut(&pixel).and_then(VecDeque::pop_front);
            scripted
                .or_else(|| st.rules.get(&pixel).cloned())
                .unwrap_or_else(|| st.default.clone())
        };
        behavior.run().await
    }
}

/// Build a painter record for tests.
#[must_use]
pub fn painter(id: u64, name: &str) -> PainterInfo {
    PainterInfo {
        id,
        name: name.to_owned(),
        alliance_name: String::new(),
        linked: None,
    }
}
