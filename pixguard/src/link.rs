//! Identity-link sessions.
//!
//! A user proves ownership of a painter account by painting one assigned pixel
//! inside a dedicated link tile. [`LinkSessions`] hands out those pixels and
//! [`poll_link`] watches the assigned pixel until a different painter appears.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pixguard_core::{
    Clock, PainterInfo, PainterLookup, PixelCoordinate, PixguardError, Shutdown, TILE_SIZE,
    TileCoord,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Link session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Tile whose pixels are handed out.
    pub tile: TileCoord,
    /// Pixels this close to the tile edge are never assigned.
    pub margin: u32,
    /// Concurrent sessions allowed.
    pub max_sessions: usize,
    /// Session lifetime.
    pub timeout: Duration,
    /// Polling period of [`poll_link`].
    pub poll_every: Duration,
    /// Random draws before giving up on finding a free pixel.
    pub pick_attempts: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tile: TileCoord::new(1755, 55),
            margin: 2,
            max_sessions: 20,
            timeout: Duration::from_secs(60),
            poll_every: Duration::from_secs(10),
            pick_attempts: 50,
        }
    }
}

/// A reserved pixel for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSession {
    /// External account asking to link.
    pub user: String,
    /// Canvas pixel the user must paint.
    pub pixel: PixelCoordinate,
    /// When the reservation was made.
    pub started_at: Instant,
    /// When the reservation lapses.
    pub expires_at: Instant,
}

impl LinkSession {
    /// Time left at `now`.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

/// Outcome of [`LinkSessions::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// A new reservation.
    Started(LinkSession),
    /// The user already holds a live reservation.
    Existing {
        /// The live reservation.
        session: LinkSession,
        /// Time left on it.
        remaining: Duration,
    },
    /// No capacity or no free pixel.
    Busy,
}

/// Outcome of [`poll_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A painter other than the initial one now owns the pixel.
    Linked(PainterInfo),
    /// The session lapsed first.
    TimedOut,
}

/// Registry of live link sessions, bounded by [`LinkConfig::max_sessions`].
#[derive(Debug)]
pub struct LinkSessions {
    cfg: LinkConfig,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, LinkSession>>,
}

impl LinkSessions {
    /// Empty registry.
    #[must_use]
    pub fn new(cfg: LinkConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Registry configuration.
    #[must_use]
    pub const fn config(&self) -> &LinkConfig {
        &self.cfg
    }

    /// Reserve a pixel for `user`.
    ///
    /// Behavior:
    /// - expired sessions are dropped first
    /// - a user with a live session gets it back with the time left
    /// - otherwise a random unused pixel inside the margin is drawn
    pub fn acquire(&self, user: &str) -> Acquire {
        let now = self.clock.now();
        let mut sessions = self.sessions();
        sessions.retain(|_, s| s.expires_at > now);

        if let Some(session) = sessions.get(user) {
            return Acquire::Existing {
                remaining: session.remaining(now),
                session: session.clone(),
            };
        }
        if sessions.len() >= self.cfg.max_sessions {
            return Acquire::Busy;
        }

        let used: HashSet<PixelCoordinate> = sessions.values().map(|s| s.pixel).collect();
        let Some(pixel) = self.pick(&used) else {
            return Acquire::Busy;
        };
        let session = LinkSession {
            user: user.to_owned(),
            pixel,
            started_at: now,
            expires_at: now + self.cfg.timeout,
        };
        sessions.insert(user.to_owned(), session.clone());
        debug!(user, pixel = %pixel, "link session started");
        Acquire::Started(session)
    }

    /// Drop `user`'s session. Returns `false` if there was none.
    pub fn release(&self, user: &str) -> bool {
        self.sessions().remove(user).is_some()
    }

    /// Number of unexpired sessions.
    #[must_use]
    pub fn active(&self) -> usize {
        let now = self.clock.now();
        self.sessions()
            .values()
            .filter(|s| s.expires_at > now)
            .count()
    }

    fn pick(&self, used: &HashSet<PixelCoordinate>) -> Option<PixelCoordinate> {
        let lo = self.cfg.margin;
        let hi = TILE_SIZE.checked_sub(1 + self.cfg.margin)?;
        if lo > hi {
            return None;
        }
        let mut rng = rand::rng();
        (0..self.cfg.pick_attempts)
            .map(|_| {
                PixelCoordinate::from_tile(
                    self.cfg.tile,
                    rng.random_range(lo..=hi),
                    rng.random_range(lo..=hi),
                )
            })
            .find(|px| !used.contains(px))
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, LinkSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Watch `session.pixel` until its painter changes or the session lapses.
///
/// The painter seen on the first lookup is the baseline; any later answer
/// naming a different painter (including the first painter after "none")
/// links. Errors after the first lookup are logged and polling continues.
///
/// # Errors
/// Returns the first lookup's error, or `Cancelled` once `cancel` fires.
pub async fn poll_link(
    lookup: &dyn PainterLookup,
    session: &LinkSession,
    every: Duration,
    cancel: &Shutdown,
) -> Result<LinkOutcome, PixguardError> {
    let baseline = lookup.lookup(session.pixel).await?.map(|p| p.id);
    loop {
        let next = (Instant::now() + every).min(session.expires_at);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PixguardError::Cancelled),
            () = tokio::time::sleep_until(next) => {}
        }
        if Instant::now() >= session.expires_at {
            debug!(user = %session.user, "link session timed out");
            return Ok(LinkOutcome::TimedOut);
        }
        match lookup.lookup(session.pixel).await {
            Ok(Some(painter)) if Some(painter.id) != baseline => {
                return Ok(LinkOutcome::Linked(painter));
            }
            Ok(_) => {}
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                debug!(user = %session.user, pixel = %session.pixel, error = %err, "link poll failed");
            }
        }
    }
}
