//! Error types for the gateway server.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::collaborators::CollaboratorError;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur in the gateway server.
///
/// HTTP-facing variants render as plain-text bodies carrying their display
/// string.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// The HTTP server stopped with an error.
    #[error("server error: {0}")]
    Serve(String),

    /// The request body could not be decoded.
    #[error("Invalid request body")]
    InvalidBody,

    /// The path exists but not for this method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// No route matches the path.
    #[error("Not found")]
    NotFound,

    /// The WebSocket connection limit is reached.
    #[error("Too many connections: {active} active, limit is {limit}")]
    TooManyConnections {
        /// Connections currently open.
        active: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The gateway is draining and refuses new connections.
    #[error("Server is shutting down")]
    ShuttingDown,

    /// A collaborator call failed.
    #[error("{context}: {source}")]
    Collaborator {
        /// What the gateway was doing.
        context: &'static str,
        /// The collaborator's error.
        source: CollaboratorError,
    },
}

impl GatewayError {
    /// Wrap a collaborator failure with the operation it interrupted.
    #[must_use]
    pub const fn collaborator(context: &'static str, source: CollaboratorError) -> Self {
        Self::Collaborator { context, source }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TooManyConnections { .. } | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::BindFailed(_, _) | Self::Serve(_) | Self::Collaborator { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let Self::Collaborator { context, source } = &self {
            tracing::warn!(operation = %context, error = %source, "collaborator call failed");
        }
        (
            self.status_code(),
            [("content-type", "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use test_case::test_case;

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test_case(GatewayError::InvalidBody, StatusCode::BAD_REQUEST; "invalid body")]
    #[test_case(GatewayError::MethodNotAllowed, StatusCode::METHOD_NOT_ALLOWED; "method")]
    #[test_case(GatewayError::NotFound, StatusCode::NOT_FOUND; "not found")]
    #[test_case(GatewayError::TooManyConnections { active: 2, limit: 2 }, StatusCode::SERVICE_UNAVAILABLE; "limit")]
    #[test_case(GatewayError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE; "draining")]
    #[test_case(GatewayError::Serve("boom".into()), StatusCode::INTERNAL_SERVER_ERROR; "serve")]
    fn test_status_codes(err: GatewayError, expected: StatusCode) {
        assert_eq!(err.status_code(), expected);
    }

    #[tokio::test]
    async fn test_invalid_body_is_plain_text() {
        let response = GatewayError::InvalidBody.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "Invalid request body");
    }

    #[tokio::test]
    async fn test_collaborator_error_carries_message() {
        let err = GatewayError::collaborator(
            "Command execution failed",
            CollaboratorError::Rejected("unknown action".to_string()),
        );
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(response).await,
            "Command execution failed: unknown action"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(GatewayError::MethodNotAllowed.to_string(), "Method not allowed");
        assert_eq!(
            GatewayError::TooManyConnections { active: 3, limit: 3 }.to_string(),
            "Too many connections: 3 active, limit is 3"
        );
    }
}
