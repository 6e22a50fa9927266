//! Shared state handed to every HTTP handler.

use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use robo_broker::Broker;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::collaborators::Collaborators;
use crate::config::GatewayConfig;
use crate::connections::ConnectionTracker;
use crate::hub::Hub;
use crate::types::{API_VERSION, ComponentStatus, SystemStatus};

/// State shared by the router, the handlers and the connection hub.
#[derive(Debug)]
pub struct GatewayState {
    config: GatewayConfig,
    broker: Arc<Broker>,
    collaborators: Collaborators,
    connections: Arc<ConnectionTracker>,
    hub: Hub,
    tasks: TaskTracker,
    start_time: Instant,
}

impl GatewayState {
    /// Create gateway state over an existing broker.
    #[must_use]
    pub fn new(config: GatewayConfig, broker: Arc<Broker>, collaborators: Collaborators) -> Self {
        let connections = ConnectionTracker::new(config.max_connections);
        Self::with_connections(config, broker, collaborators, connections)
    }

    /// Create gateway state that reports into an existing connection tracker.
    ///
    /// The tracker's own limit applies; `config.max_connections` is ignored.
    #[must_use]
    pub fn with_connections(
        config: GatewayConfig,
        broker: Arc<Broker>,
        collaborators: Collaborators,
        connections: Arc<ConnectionTracker>,
    ) -> Self {
        let hub = Hub::new(Arc::clone(&broker), config.hub, CancellationToken::new());
        Self {
            config,
            broker,
            collaborators,
            connections,
            hub,
            tasks: TaskTracker::new(),
            start_time: Instant::now(),
        }
    }

    /// Gateway configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The shared broker.
    #[must_use]
    pub const fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Delegation targets.
    #[must_use]
    pub const fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Open connection accounting.
    #[must_use]
    pub const fn connections(&self) -> &Arc<ConnectionTracker> {
        &self.connections
    }

    /// The connection hub.
    #[must_use]
    pub const fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Tracker for running connection tasks.
    #[must_use]
    pub const fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Signal every connection to flush and close.
    pub fn close_connections(&self) {
        self.hub.shutdown_token().cancel();
    }

    /// Force connections still draining to stop writing. Implies
    /// [`close_connections`](Self::close_connections).
    pub fn abort_connections(&self) {
        self.close_connections();
        self.hub.abort_token().cancel();
    }

    /// Whether connections have been told to close.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.hub.shutdown_token().is_cancelled()
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Assemble the `/api/v1/status` document.
    #[must_use]
    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            status: "operational".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            version: API_VERSION.to_string(),
            components: ComponentStatus {
                api: "online".to_string(),
                core: self.collaborators.commands.status(),
                cloud: self.collaborators.cloud.status(),
                message: self.broker.status().to_string(),
            },
        }
    }
}
