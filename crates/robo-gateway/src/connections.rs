//! Accounting for open WebSocket connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counts open connections against a fixed limit.
#[derive(Debug)]
pub struct ConnectionTracker {
    active: AtomicUsize,
    total: AtomicU64,
    limit: usize,
}

impl ConnectionTracker {
    /// Create a tracker allowing at most `limit` concurrent connections.
    #[must_use]
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            total: AtomicU64::new(0),
            limit,
        })
    }

    /// Reserve a slot. Returns `None` when the limit is reached.
    ///
    /// The slot is released when the returned permit is dropped.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionPermit> {
        let limit = self.limit;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;
        self.total.fetch_add(1, Ordering::Relaxed);
        Some(ConnectionPermit {
            tracker: Arc::clone(self),
        })
    }

    /// Connections currently open.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Connections accepted since start.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Configured maximum.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

/// A reserved connection slot.
#[derive(Debug)]
pub struct ConnectionPermit {
    tracker: Arc<ConnectionTracker>,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::AcqRel);
    }
}
