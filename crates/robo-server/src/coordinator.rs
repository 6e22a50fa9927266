//! Startup and ordered shutdown of the broker, services and gateway.
//!
//! Startup is fail-fast: every service is initialized and the gateway bound
//! before any task is spawned, so a failure leaves nothing running. Shutdown
//! stops the gateway first, lets connections drain for a grace period, and
//! only then closes the broker and stops the services, so no handler ever
//! sees a half-closed broker.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use robo_broker::Broker;
use robo_gateway::{Collaborators, ConnectionTracker, GatewayConfig, GatewayServer, GatewayState};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::local::{LocalCloud, LocalCore};
use crate::metrics::PrometheusExporter;
use crate::service::Service;

/// Default time connections get to drain after the shutdown signal.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Default bound on service cleanup once the broker is closed.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_millis(250);

/// Lifecycle settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Gateway settings.
    pub gateway: GatewayConfig,
    /// How long the gateway and its connections may take to drain.
    pub shutdown_grace: Duration,
    /// Last-resort bound on service tasks after cancellation.
    pub cleanup_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl CoordinatorConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub const fn new(gateway: GatewayConfig) -> Self {
        Self {
            gateway,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }

    /// Set the drain grace period.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the service cleanup bound.
    #[must_use]
    pub const fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }
}

/// What happened during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The gateway and every connection finished within the grace period.
    pub gateway_drained: bool,
    /// Connections told to abandon their final flush.
    pub connections_aborted: usize,
    /// Connection tasks still running when shutdown returned.
    pub connections_remaining: usize,
    /// Service tasks aborted after the cleanup bound.
    pub services_aborted: usize,
    /// Wall time from signal to return.
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// Whether everything stopped on its own.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.gateway_drained && self.connections_remaining == 0 && self.services_aborted == 0
    }
}

/// Assembles the system and starts it.
pub struct Coordinator {
    config: CoordinatorConfig,
    broker: Arc<Broker>,
    collaborators: Collaborators,
    connections: Arc<ConnectionTracker>,
    services: Vec<Arc<dyn Service>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<_> = self.services.iter().map(|s| s.name()).collect();
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("broker", &self.broker)
            .field("services", &services)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator over an existing broker and collaborators.
    #[must_use]
    pub fn new(config: CoordinatorConfig, broker: Arc<Broker>, collaborators: Collaborators) -> Self {
        let connections = ConnectionTracker::new(config.gateway.max_connections);
        Self {
            config,
            broker,
            collaborators,
            connections,
            services: Vec::new(),
        }
    }

    /// Standalone system backed by the in-process collaborators.
    #[must_use]
    pub fn local(config: CoordinatorConfig, sensor_topics: Vec<String>) -> Self {
        let broker = Broker::shared();
        let connections = ConnectionTracker::new(config.gateway.max_connections);
        let core = Arc::new(LocalCore::new(Arc::clone(&broker), sensor_topics));
        let cloud = Arc::new(LocalCloud::new(Arc::clone(&broker)));
        let diagnostics = Arc::new(PrometheusExporter::new(
            Arc::clone(&broker),
            Arc::clone(&connections),
        ));

        let collaborators = Collaborators {
            commands: core.clone(),
            algorithms: core.clone(),
            sensors: core.clone(),
            cloud: cloud.clone(),
            diagnostics,
        };

        Self::new(config, broker, collaborators)
            .with_connections(connections)
            .with_service(core)
            .with_service(cloud)
    }

    /// Report WebSocket connections into `connections`.
    #[must_use]
    pub fn with_connections(mut self, connections: Arc<ConnectionTracker>) -> Self {
        self.connections = connections;
        self
    }

    /// Add a service. Services start in the order added.
    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// The shared broker.
    #[must_use]
    pub const fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Initialize everything, then spawn it.
    ///
    /// # Errors
    ///
    /// Returns the first initialization failure: a closed broker, a service
    /// whose `start` fails, or a gateway that cannot bind. The broker is closed
    /// and nothing is left running.
    pub async fn start(self) -> ServiceResult<RunningSystem> {
        if self.broker.is_closed() {
            return Err(ServiceError::BrokerClosed);
        }
        info!(services = self.services.len(), "starting robocore");

        for service in &self.services {
            if let Err(e) = service.start().await {
                error!(service = service.name(), error = %e, "service failed to start");
                self.broker.close();
                return Err(e);
            }
            debug!(service = service.name(), "service initialized");
        }

        let state = Arc::new(GatewayState::with_connections(
            self.config.gateway.clone(),
            Arc::clone(&self.broker),
            self.collaborators,
            self.connections,
        ));
        let server = match GatewayServer::bind(Arc::clone(&state)).await {
            Ok(server) => server,
            Err(e) => {
                error!(error = %e, "gateway failed to bind");
                self.broker.close();
                return Err(e.into());
            }
        };
        let gateway_addr = server.local_addr();

        let services_token = CancellationToken::new();
        let mut services = JoinSet::new();
        for service in self.services {
            let cancel = services_token.clone();
            services.spawn(async move {
                service.run(cancel).await;
                service.name()
            });
        }

        let gateway_token = CancellationToken::new();
        let gateway_exited = CancellationToken::new();
        let gateway = {
            let token = gateway_token.clone();
            let exited = gateway_exited.clone();
            tokio::spawn(async move {
                let _exited = exited.drop_guard();
                if let Err(e) = server.serve_with_shutdown(token).await {
                    error!(error = %e, "gateway failed");
                }
            })
        };

        info!(addr = %gateway_addr, "robocore running");
        Ok(RunningSystem {
            config: self.config,
            broker: self.broker,
            state,
            gateway_addr,
            gateway,
            gateway_token,
            gateway_exited,
            services,
            services_token,
        })
    }
}

/// A started system, owned until shutdown.
#[derive(Debug)]
pub struct RunningSystem {
    config: CoordinatorConfig,
    broker: Arc<Broker>,
    state: Arc<GatewayState>,
    gateway_addr: SocketAddr,
    gateway: JoinHandle<()>,
    gateway_token: CancellationToken,
    gateway_exited: CancellationToken,
    services: JoinSet<&'static str>,
    services_token: CancellationToken,
}

impl RunningSystem {
    /// Address the gateway is listening on.
    #[must_use]
    pub const fn gateway_addr(&self) -> SocketAddr {
        self.gateway_addr
    }

    /// Gateway state shared with the handlers.
    #[must_use]
    pub const fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// The shared broker.
    #[must_use]
    pub const fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Run until `signal` resolves or the gateway stops on its own, then shut
    /// down.
    pub async fn run_until<F>(self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()> + Send,
    {
        tokio::select! {
            () = signal => info!("shutdown signal received"),
            () = self.gateway_exited.cancelled() => warn!("gateway stopped unexpectedly"),
        }
        self.shutdown().await
    }

    /// Ordered shutdown: gateway, connections, broker, services.
    pub async fn shutdown(self) -> ShutdownReport {
        let started = Instant::now();
        let Self {
            config,
            broker,
            state,
            mut gateway,
            gateway_token,
            mut services,
            services_token,
            ..
        } = self;

        info!(grace = ?config.shutdown_grace, "stopping gateway");
        gateway_token.cancel();
        state.close_connections();
        let tasks = state.tasks().clone();
        tasks.close();

        let deadline = started + config.shutdown_grace;
        let gateway_drained = timeout_at(deadline, async {
            if let Err(e) = (&mut gateway).await {
                warn!(error = %e, "gateway task failed");
            }
            tasks.wait().await;
        })
        .await
        .is_ok();

        let mut connections_aborted = 0;
        if !gateway_drained {
            connections_aborted = tasks.len();
            warn!(
                connections = connections_aborted,
                "grace period expired; aborting remaining connections"
            );
            gateway.abort();
            state.abort_connections();
            let _ = timeout(config.cleanup_timeout, tasks.wait()).await;
        }
        let connections_remaining = tasks.len();

        info!("closing broker");
        services_token.cancel();
        broker.close();

        let services_joined = timeout(config.cleanup_timeout, async {
            while let Some(joined) = services.join_next().await {
                match joined {
                    Ok(name) => debug!(service = name, "service stopped"),
                    Err(e) => warn!(error = %e, "service task failed"),
                }
            }
        })
        .await
        .is_ok();

        let mut services_aborted = 0;
        if !services_joined {
            services_aborted = services.len();
            warn!(services = services_aborted, "services did not stop in time; aborting");
            services.abort_all();
        }

        let report = ShutdownReport {
            gateway_drained,
            connections_aborted,
            connections_remaining,
            services_aborted,
            elapsed: started.elapsed(),
        };
        info!(?report, "shutdown complete");
        report
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
