//! HTTP request handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, info};

use crate::collaborators::{CommandRequest, SyncRequest};
use crate::connections::ConnectionPermit;
use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;
use crate::types::{AlgorithmRegistered, SyncStarted, SystemStatus};

/// Decode a JSON request body; any failure is a client error.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> GatewayResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "rejecting request body");
        GatewayError::InvalidBody
    })
}

/// Liveness probe.
pub async fn health_check() -> &'static str {
    "OK"
}

/// `GET /api/v1/status`
pub async fn get_status(State(state): State<Arc<GatewayState>>) -> Json<SystemStatus> {
    Json(state.system_status())
}

/// `POST /api/v1/command`
pub async fn execute_command(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> GatewayResult<Json<Value>> {
    let request: CommandRequest = decode_body(&body)?;
    debug!(action = %request.action, target = %request.target, "executing command");

    let result = state
        .collaborators()
        .commands
        .execute_command(request)
        .await
        .map_err(|e| GatewayError::collaborator("Command execution failed", e))?;
    Ok(Json(result))
}

/// `GET /api/v1/algorithms`
pub async fn list_algorithms(State(state): State<Arc<GatewayState>>) -> GatewayResult<Json<Value>> {
    let algorithms = state
        .collaborators()
        .algorithms
        .list_algorithms()
        .await
        .map_err(|e| GatewayError::collaborator("Failed to get algorithms", e))?;
    Ok(Json(algorithms))
}

/// `POST /api/v1/algorithms`
pub async fn register_algorithm(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> GatewayResult<Json<AlgorithmRegistered>> {
    let definition: Value = decode_body(&body)?;
    let id = state
        .collaborators()
        .algorithms
        .register_algorithm(definition)
        .await
        .map_err(|e| GatewayError::collaborator("Algorithm registration failed", e))?;
    info!(algorithm_id = %id, "algorithm registered");
    Ok(Json(AlgorithmRegistered { id }))
}

/// `GET /api/v1/sensors`
pub async fn get_sensors(State(state): State<Arc<GatewayState>>) -> GatewayResult<Json<Value>> {
    let snapshot = state
        .collaborators()
        .sensors
        .sensor_snapshot()
        .await
        .map_err(|e| GatewayError::collaborator("Failed to get sensor data", e))?;
    Ok(Json(snapshot))
}

/// `POST /api/v1/cloud/sync`
pub async fn trigger_sync(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> GatewayResult<Json<SyncStarted>> {
    let request: SyncRequest = decode_body(&body)?;
    let sync_id = state
        .collaborators()
        .cloud
        .trigger_sync(request.mode)
        .await
        .map_err(|e| GatewayError::collaborator("Failed to start sync", e))?;
    info!(%sync_id, mode = %request.mode, "cloud sync started");
    Ok(Json(SyncStarted { sync_id }))
}

/// `GET /api/v1/cloud/status`
pub async fn cloud_status(State(state): State<Arc<GatewayState>>) -> GatewayResult<Json<Value>> {
    let status = state
        .collaborators()
        .cloud
        .sync_status()
        .await
        .map_err(|e| GatewayError::collaborator("Failed to get cloud status", e))?;
    Ok(Json(status))
}

/// `GET /metrics`
pub async fn get_metrics(State(state): State<Arc<GatewayState>>) -> Response {
    let exporter = &state.collaborators().diagnostics;
    (
        [(header::CONTENT_TYPE, exporter.content_type())],
        exporter.export(),
    )
        .into_response()
}

/// A connection slot plus a claim on the task tracker, held from before the
/// upgrade response is sent until the socket is served.
struct Admission {
    _permit: ConnectionPermit,
    _reservation: TaskTrackerToken,
}

fn admit(state: &GatewayState) -> GatewayResult<Admission> {
    // Reserved before the closing check so shutdown cannot miss it.
    let reservation = state.tasks().token();
    if state.is_closing() {
        return Err(GatewayError::ShuttingDown);
    }
    let connections = state.connections();
    let Some(permit) = connections.try_acquire() else {
        return Err(GatewayError::TooManyConnections {
            active: connections.active(),
            limit: connections.limit(),
        });
    };
    Ok(Admission {
        _permit: permit,
        _reservation: reservation,
    })
}

/// `GET /api/v1/ws`: upgrade and hand the socket to the hub.
pub async fn ws_upgrade(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
) -> GatewayResult<Response> {
    let admission = admit(&state)?;
    let hub = state.hub().clone();
    let limit = hub.config().transport_message_limit();

    Ok(ws
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let _admission = admission;
            hub.serve(socket).await;
        }))
}

/// Any method not routed for a known path.
pub async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}

/// Any unknown path.
pub async fn not_found() -> GatewayError {
    GatewayError::NotFound
}
