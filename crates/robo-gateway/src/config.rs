//! Gateway and connection hub configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default outbound queue depth per connection.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Default largest inbound frame accepted, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024;

/// Default cap on topics a single connection may hold.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 256;

/// Default number of queued envelopes written per flush.
pub const DEFAULT_MAX_BATCH: usize = 64;

/// Shortest keepalive ping interval the write loop will run with.
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Per-connection settings for the connection hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Bounded outbound queue capacity. Deliveries beyond it are dropped.
    pub outbound_capacity: usize,
    /// Largest inbound frame; anything bigger closes the connection.
    pub max_frame_size: usize,
    /// Maximum topics one connection may subscribe to.
    pub max_subscriptions: usize,
    /// Maximum queued envelopes coalesced into one flush.
    pub max_batch: usize,
    /// Deadline for a single write (batch, ping or close).
    pub write_timeout: Duration,
    /// How long the peer may stay silent before the connection is dropped.
    pub pong_wait: Duration,
    /// Interval between keepalive pings. Must be shorter than `pong_wait`.
    pub ping_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
            max_batch: DEFAULT_MAX_BATCH,
            write_timeout: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
        }
    }
}

impl HubConfig {
    /// Set the outbound queue capacity (minimum 1).
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the maximum inbound frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Set the per-connection subscription cap.
    #[must_use]
    pub const fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Set the write batch bound (minimum 1).
    #[must_use]
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = max.max(1);
        self
    }

    /// Set the write deadline.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the liveness window and derive the ping interval as 9/10 of it.
    #[must_use]
    pub fn with_pong_wait(mut self, wait: Duration) -> Self {
        self.pong_wait = wait;
        self.ping_interval = (wait * 9 / 10).max(MIN_PING_INTERVAL);
        self
    }

    /// Override the ping interval (minimum [`MIN_PING_INTERVAL`]).
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval.max(MIN_PING_INTERVAL);
        self
    }

    /// Message size limit handed to the WebSocket transport.
    ///
    /// Set above `max_frame_size` so oversized frames reach the hub and are
    /// closed with a "message too big" code instead of a bare transport error.
    #[must_use]
    pub const fn transport_message_limit(&self) -> usize {
        self.max_frame_size.saturating_mul(2)
    }
}

/// Configuration for the gateway server.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
    /// Per-connection hub settings.
    pub hub: HubConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            cors_origins: Vec::new(),
            hub: HubConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a configuration bound to `bind_addr`.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Set the maximum concurrent WebSocket connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }

    /// Replace the hub settings.
    #[must_use]
    pub const fn with_hub(mut self, hub: HubConfig) -> Self {
        self.hub = hub;
        self
    }
}
