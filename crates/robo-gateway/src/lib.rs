//! # robo-gateway
//!
//! HTTP API gateway and WebSocket connection hub for robocore.
//!
//! The gateway answers status and health requests itself, delegates commands,
//! algorithm registration, sensor snapshots and cloud sync to collaborator
//! traits, and upgrades `/api/v1/ws` into a per-connection hub that bridges
//! client envelopes to the shared [`robo_broker::Broker`].
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/v1/status` | GET | System status with component health |
//! | `/api/v1/command` | POST | Execute a command |
//! | `/api/v1/algorithms` | GET, POST | List or register algorithms |
//! | `/api/v1/sensors` | GET | Sensor snapshot |
//! | `/api/v1/cloud/sync` | POST | Start a cloud sync |
//! | `/api/v1/cloud/status` | GET | Cloud sync status |
//! | `/api/v1/ws` | GET | WebSocket pub/sub |
//! | `/health` | GET | Liveness probe |
//! | `/metrics` | GET | Diagnostics export |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use robo_gateway::{Collaborators, GatewayConfig, GatewayServer, GatewayState};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(collaborators: Collaborators) -> Result<(), robo_gateway::GatewayError> {
//! let broker = robo_broker::Broker::shared();
//! let state = Arc::new(GatewayState::new(GatewayConfig::default(), broker, collaborators));
//! let server = GatewayServer::bind(state).await?;
//! server.serve_with_shutdown(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collaborators;
pub mod config;
pub mod connections;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

pub use collaborators::{
    AlgorithmStore, CloudSync, CollaboratorError, CollaboratorResult, Collaborators,
    CommandExecutor, CommandRequest, DiagnosticsExporter, SensorSource, SyncMode,
};
pub use config::{GatewayConfig, HubConfig};
pub use connections::{ConnectionPermit, ConnectionTracker};
pub use error::{GatewayError, GatewayResult};
pub use hub::{CloseReason, ConnectionId, ConnectionState, ConnectionSummary, Hub};
pub use routes::create_router;
pub use server::GatewayServer;
pub use state::GatewayState;
pub use types::{AlgorithmRegistered, ComponentStatus, SyncStarted, SystemStatus};
