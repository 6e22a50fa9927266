//! Response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

/// Version reported by `/api/v1/status`.
pub const API_VERSION: &str = "0.1.0";

/// Body of `GET /api/v1/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Overall state; always `operational` while the gateway answers.
    pub status: String,
    /// RFC 3339 UTC timestamp.
    pub timestamp: String,
    /// API version.
    pub version: String,
    /// Per-component health.
    pub components: ComponentStatus,
}

/// Health of each component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// The gateway itself.
    pub api: String,
    /// Command executor.
    pub core: String,
    /// Cloud synchronization.
    pub cloud: String,
    /// Message broker.
    pub message: String,
}

/// Body of `POST /api/v1/algorithms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmRegistered {
    /// Assigned id.
    pub id: String,
}

/// Body of `POST /api/v1/cloud/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStarted {
    /// Id of the started sync.
    pub sync_id: String,
}
