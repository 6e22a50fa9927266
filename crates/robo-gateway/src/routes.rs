//! Route configuration for the gateway API.

use std::sync::Arc;

use axum::routing::{Router, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::handlers::{
    cloud_status, execute_command, get_metrics, get_sensors, get_status, health_check,
    list_algorithms, method_not_allowed, not_found, register_algorithm, trigger_sync, ws_upgrade,
};
use crate::state::GatewayState;

/// Create the gateway router.
pub fn create_router(state: Arc<GatewayState>) -> Router {
    let cors = build_cors_layer(state.config());

    let api_routes = Router::new()
        .route(
            "/status",
            get(get_status)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route("/command", post(execute_command).fallback(method_not_allowed))
        .route(
            "/algorithms",
            get(list_algorithms)
                .head(method_not_allowed)
                .post(register_algorithm)
                .fallback(method_not_allowed),
        )
        .route(
            "/sensors",
            get(get_sensors)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route("/cloud/sync", post(trigger_sync).fallback(method_not_allowed))
        .route(
            "/cloud/status",
            get(cloud_status)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/ws",
            get(ws_upgrade)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route(
            "/health",
            get(health_check)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/metrics",
            get(get_metrics)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &GatewayConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
