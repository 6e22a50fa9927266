//! Error types for broker operations.

use thiserror::Error;

use crate::subscriber::SubscriberId;

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur during broker operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// The topic name is not acceptable (currently: empty).
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// No subscription exists for the given topic and subscriber.
    #[error("{subscriber} is not subscribed to {topic}")]
    NotSubscribed {
        /// Topic name.
        topic: String,
        /// Subscriber identifier.
        subscriber: SubscriberId,
    },

    /// The broker has been shut down.
    #[error("broker is closed")]
    Closed,
}

impl BrokerError {
    /// Whether the error is the benign "already removed" case.
    #[must_use]
    pub const fn is_not_subscribed(&self) -> bool {
        matches!(self, Self::NotSubscribed { .. })
    }
}
