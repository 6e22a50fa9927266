//! Connection hub: one owner per upgraded WebSocket.
//!
//! Each connection runs two cooperating loops:
//!
//! - the **read loop** decodes inbound frames and turns them into broker
//!   operations through a [`Session`], replying with acks or error envelopes;
//! - the **write loop** drains the bounded outbound queue in batches, sends
//!   keepalive pings and enforces the liveness window.
//!
//! Broker deliveries are pushed onto the queue without waiting and dropped
//! when it is full, so a slow reader only ever loses its own messages.

mod connection;
mod error;
mod id;
mod liveness;
mod session;

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use robo_broker::Broker;
use tokio_util::sync::CancellationToken;

pub use connection::{CloseReason, Connection, ConnectionSummary};
pub use error::HubError;
pub use id::{ConnectionId, ConnectionState};
pub use liveness::Liveness;
pub use session::{Outbound, OutboundReceiver, OutboundSender, Session, delivery_sink, outbound_queue};

use crate::config::HubConfig;

/// Creates and runs connections against a shared broker.
#[derive(Debug, Clone)]
pub struct Hub {
    broker: Arc<Broker>,
    config: HubConfig,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl Hub {
    /// Create a hub. Cancelling `shutdown` makes every connection flush and
    /// close.
    #[must_use]
    pub fn new(broker: Arc<Broker>, config: HubConfig, shutdown: CancellationToken) -> Self {
        Self {
            broker,
            config,
            shutdown,
            abort: CancellationToken::new(),
        }
    }

    /// Per-connection settings.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// The gateway-wide stop signal.
    #[must_use]
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Cancelled when draining connections must give up their final flush.
    #[must_use]
    pub const fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    /// Accept a new connection without starting it.
    #[must_use]
    pub fn accept(&self) -> Connection {
        Connection::accept(Arc::clone(&self.broker), self.config, self.shutdown.clone())
            .with_abort(self.abort.clone())
    }

    /// Run an upgraded socket to completion.
    pub async fn serve(&self, socket: WebSocket) -> ConnectionSummary {
        let (sink, stream) = socket.split();
        self.accept().run(stream, sink).await
    }
}
