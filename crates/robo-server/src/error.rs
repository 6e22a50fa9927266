//! Error types for service lifecycle.

use robo_gateway::GatewayError;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised while bringing the system up.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A service failed to initialize.
    #[error("{service} failed to start: {reason}")]
    Init {
        /// Service name.
        service: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// The broker was already closed when startup began.
    #[error("message broker is closed")]
    BrokerClosed,

    /// The gateway could not be started.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ServiceError {
    /// Build an initialization error.
    pub fn init(service: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Init {
            service,
            reason: reason.to_string(),
        }
    }
}
