//! Shared last-seen clock for one connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Records when the peer was last heard from.
///
/// Written by the read loop on every inbound frame, read by both loops to
/// derive the liveness deadline.
#[derive(Debug)]
pub struct Liveness {
    origin: Instant,
    last_seen_ms: AtomicU64,
}

impl Liveness {
    /// Start the clock now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    /// Mark the peer as alive now.
    pub fn touch(&self) {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.last_seen_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// When the peer was last heard from.
    #[must_use]
    pub fn last_seen(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed))
    }

    /// Instant after which the peer counts as gone.
    #[must_use]
    pub fn deadline(&self, window: Duration) -> Instant {
        self.last_seen() + window
    }

    /// Whether `window` has passed since the peer was last heard from.
    #[must_use]
    pub fn is_expired(&self, window: Duration) -> bool {
        Instant::now() >= self.deadline(window)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
