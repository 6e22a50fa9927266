//! Contracts for the components the gateway delegates to.
//!
//! The gateway never interprets commands, algorithms, sensor data or sync
//! state; it only marshals requests into these traits and encodes whatever
//! comes back.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result type alias for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Failure reported by a collaborator. Displays as the bare reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The request was understood but refused.
    #[error("{0}")]
    Rejected(String),

    /// The collaborator is not running.
    #[error("{0}")]
    Unavailable(String),

    /// The collaborator failed internally.
    #[error("{0}")]
    Internal(String),
}

/// Body of `POST /api/v1/command`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// What to do.
    #[serde(default)]
    pub action: String,
    /// What to do it to.
    #[serde(default)]
    pub target: String,
    /// Opaque parameters.
    #[serde(default)]
    pub params: Value,
}

/// Cloud synchronization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Resynchronize everything.
    Full,
    /// Synchronize changes since the last sync.
    Incremental,
}

impl SyncMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/v1/cloud/sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SyncRequest {
    /// Requested mode.
    pub mode: SyncMode,
}

/// Runs robot commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute one command and return its result document.
    async fn execute_command(&self, request: CommandRequest) -> CollaboratorResult<Value>;

    /// Health string reported as the `core` component.
    fn status(&self) -> String;
}

/// Registry of algorithm definitions.
#[async_trait]
pub trait AlgorithmStore: Send + Sync {
    /// All registered algorithms.
    async fn list_algorithms(&self) -> CollaboratorResult<Value>;

    /// Register an opaque definition and return its id.
    async fn register_algorithm(&self, definition: Value) -> CollaboratorResult<String>;
}

/// Produces the current sensor snapshot.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Latest sensor readings.
    async fn sensor_snapshot(&self) -> CollaboratorResult<Value>;
}

/// Cloud synchronization engine.
#[async_trait]
pub trait CloudSync: Send + Sync {
    /// Start a sync and return its id.
    async fn trigger_sync(&self, mode: SyncMode) -> CollaboratorResult<String>;

    /// Current synchronization state.
    async fn sync_status(&self) -> CollaboratorResult<Value>;

    /// Health string reported as the `cloud` component.
    fn status(&self) -> String;
}

/// Renders the `/metrics` document.
pub trait DiagnosticsExporter: Send + Sync {
    /// The exported text.
    fn export(&self) -> String;

    /// MIME type of [`export`](Self::export).
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }
}

/// The set of collaborators the gateway delegates to.
#[derive(Clone)]
pub struct Collaborators {
    /// Command execution.
    pub commands: Arc<dyn CommandExecutor>,
    /// Algorithm registry.
    pub algorithms: Arc<dyn AlgorithmStore>,
    /// Sensor snapshots.
    pub sensors: Arc<dyn SensorSource>,
    /// Cloud synchronization.
    pub cloud: Arc<dyn CloudSync>,
    /// Diagnostics export.
    pub diagnostics: Arc<dyn DiagnosticsExporter>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("core", &self.commands.status())
            .field("cloud", &self.cloud.status())
            .finish_non_exhaustive()
    }
}
