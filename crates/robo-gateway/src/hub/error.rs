//! Per-connection failures.

use std::time::Duration;

use thiserror::Error;

/// Errors that end a connection's loops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    /// The write side is gone; nothing more can be queued.
    #[error("outbound queue closed")]
    QueueClosed,

    /// The socket reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A write did not complete within the deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}

impl HubError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
