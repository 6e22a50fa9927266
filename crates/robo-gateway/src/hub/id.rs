//! Connection identity and lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use robo_broker::SubscriberId;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier, rendered `ws-<n>`.
///
/// Allocated from a monotonic counter at accept time and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric part.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The broker-side identity of this connection.
    #[must_use]
    pub fn subscriber_id(self) -> SubscriberId {
        SubscriberId::from(self.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Upgraded, loops not started yet.
    Accepted,
    /// Read and write loops running.
    Active,
    /// One loop ended; tearing down.
    Closing,
    /// Both loops exited and subscriptions released.
    Closed,
}

impl ConnectionState {
    /// Whether moving to `next` is a legal forward step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Accepted, Self::Active | Self::Closing)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Lower-case name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();

        assert!(second > first);
        assert_ne!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_id_rendering() {
        let id = ConnectionId(42);
        assert_eq!(id.to_string(), "ws-42");
        assert_eq!(id.subscriber_id().as_str(), "ws-42");
        assert_eq!(id.get(), 42);
    }

    #[test_case(ConnectionState::Accepted, ConnectionState::Active, true; "accept to active")]
    #[test_case(ConnectionState::Active, ConnectionState::Closing, true; "active to closing")]
    #[test_case(ConnectionState::Closing, ConnectionState::Closed, true; "closing to closed")]
    #[test_case(ConnectionState::Accepted, ConnectionState::Closing, true; "failed start")]
    #[test_case(ConnectionState::Closed, ConnectionState::Active, false; "no resurrection")]
    #[test_case(ConnectionState::Active, ConnectionState::Closed, false; "no skipping teardown")]
    fn test_state_transitions(from: ConnectionState, to: ConnectionState, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }
}
