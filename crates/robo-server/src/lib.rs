//! robocore lifecycle: coordinator, services and standalone collaborators.
//!
//! The [`Coordinator`] owns the shared [`Broker`](robo_broker::Broker), starts
//! every registered [`Service`] and binds the gateway, then drives an ordered,
//! time-bounded shutdown:
//!
//! 1. the gateway stops accepting and every connection is told to flush;
//! 2. connections get [`CoordinatorConfig::shutdown_grace`] to drain;
//! 3. services are cancelled, the broker closed and service tasks joined.
//!
//! # Example
//!
//! ```rust,no_run
//! use robo_server::{Coordinator, CoordinatorConfig, shutdown_signal};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let running = Coordinator::local(CoordinatorConfig::default(), vec!["sensors".into()])
//!     .start()
//!     .await?;
//! println!("listening on {}", running.gateway_addr());
//!
//! let report = running.run_until(shutdown_signal()).await;
//! assert!(report.gateway_drained);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod coordinator;
pub mod error;
pub mod local;
pub mod metrics;
pub mod service;
pub mod telemetry;

pub use cli::Cli;
pub use coordinator::{Coordinator, CoordinatorConfig, RunningSystem, ShutdownReport, shutdown_signal};
pub use error::{ServiceError, ServiceResult};
pub use local::{LocalCloud, LocalCore};
pub use metrics::PrometheusExporter;
pub use service::Service;
pub use telemetry::{LogFormat, init_tracing};
