//! HTTP mapping of orchestrator errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ArenaError;

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind, e.g. `ValidationError`
    pub error: String,
    /// Human-readable description
    pub message: String,
}

/// API-level error; a thin wrapper deciding the status code
#[derive(Debug)]
pub struct ApiError(ArenaError);

impl From<ArenaError> for ApiError {
    fn from(err: ArenaError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            ArenaError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            ArenaError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ArenaError::Conflict(_) => (StatusCode::CONFLICT, "ConflictError"),
            ArenaError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
            ArenaError::LauncherUnreachable(_) | ArenaError::Network(_) => {
                (StatusCode::BAD_GATEWAY, "LauncherUnreachable")
            }
            ArenaError::ResetRejected(_) => (StatusCode::BAD_GATEWAY, "ResetRejected"),
            ArenaError::Protocol(_) => (StatusCode::BAD_GATEWAY, "ProtocolError"),
            ArenaError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageError"),
        };

        let body = Json(ErrorResponse {
            error: kind.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let response = ApiError(ArenaError::Validation("nope".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_maps_to_conflict() {
        let response = ApiError(ArenaError::Conflict("busy".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let response = ApiError(ArenaError::NotFound("gone".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
