//! Command-line and environment configuration for the `robocore` binary.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use robo_gateway::{GatewayConfig, HubConfig};

use crate::coordinator::CoordinatorConfig;
use crate::telemetry::LogFormat;

/// Robot control gateway: HTTP API, WebSocket pub/sub and local services.
#[derive(Debug, Parser)]
#[command(name = "robocore")]
#[command(version)]
pub struct Cli {
    /// Address the HTTP server binds to.
    #[arg(long, env = "ROBOCORE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Default log filter, overridden by `RUST_LOG`.
    #[arg(long, env = "ROBOCORE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "ROBOCORE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Maximum simultaneous WebSocket connections.
    #[arg(long, env = "ROBOCORE_MAX_CONNECTIONS", default_value_t = 1000)]
    pub max_connections: usize,

    /// Outbound queue depth per connection.
    #[arg(long, env = "ROBOCORE_OUTBOUND_CAPACITY", default_value_t = robo_gateway::config::DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,

    /// Topic subscriptions allowed per connection.
    #[arg(long, env = "ROBOCORE_MAX_SUBSCRIPTIONS", default_value_t = robo_gateway::config::DEFAULT_MAX_SUBSCRIPTIONS)]
    pub max_subscriptions: usize,

    /// Largest inbound frame in bytes.
    #[arg(long, env = "ROBOCORE_MAX_FRAME_SIZE", default_value_t = robo_gateway::config::DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Seconds open connections get to drain on shutdown.
    #[arg(long, env = "ROBOCORE_SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Allowed CORS origin; repeat for several. Any origin when omitted.
    #[arg(long = "cors-origin", env = "ROBOCORE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Topics the core caches for the sensor snapshot.
    #[arg(
        long = "sensor-topic",
        env = "ROBOCORE_SENSOR_TOPICS",
        value_delimiter = ',',
        default_value = "sensors"
    )]
    pub sensor_topics: Vec<String>,
}

impl Cli {
    /// Lifecycle configuration derived from the arguments.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let hub = HubConfig::default()
            .with_outbound_capacity(self.outbound_capacity)
            .with_max_subscriptions(self.max_subscriptions)
            .with_max_frame_size(self.max_frame_size);

        let gateway = self
            .cors_origins
            .iter()
            .fold(GatewayConfig::new(self.bind), |config, origin| {
                config.with_cors_origin(origin.clone())
            })
            .with_max_connections(self.max_connections)
            .with_hub(hub);

        CoordinatorConfig::new(gateway)
            .with_shutdown_grace(Duration::from_secs(self.shutdown_grace_secs))
    }
}
