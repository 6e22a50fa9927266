//! Gateway server: binds the listener and serves the router.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::routes::create_router;
use crate::state::GatewayState;

/// A bound, not yet serving, gateway.
///
/// Binding is separate from serving so an unusable address fails startup
/// before anything else is spawned.
#[derive(Debug)]
pub struct GatewayServer {
    state: Arc<GatewayState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl GatewayServer {
    /// Bind to the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BindFailed`] if the address cannot be bound.
    pub async fn bind(state: Arc<GatewayState>) -> GatewayResult<Self> {
        let addr = state.config().bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::BindFailed(addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::BindFailed(addr, e))?;

        info!(addr = %local_addr, "gateway listening");
        Ok(Self {
            state,
            listener,
            local_addr,
        })
    }

    /// The address actually bound (resolves port 0).
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared gateway state.
    #[must_use]
    pub fn state(&self) -> Arc<GatewayState> {
        Arc::clone(&self.state)
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// Cancellation stops accepting, signals every open connection to flush
    /// and close, and lets in-flight HTTP requests finish. Connection tasks
    /// keep running on the state's task tracker; wait on it to observe them.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serve`] if the server fails.
    pub async fn serve_with_shutdown(self, shutdown: CancellationToken) -> GatewayResult<()> {
        let router = create_router(Arc::clone(&self.state));
        let state = Arc::clone(&self.state);
        let signal = async move {
            shutdown.cancelled().await;
            info!("gateway stopping");
            state.close_connections();
        };

        axum::serve(self.listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| GatewayError::Serve(e.to_string()))?;

        info!("gateway stopped accepting");
        Ok(())
    }
}
