//! HTTP API handlers for the fulfillment engine

pub mod checkcount;
pub mod health;
pub mod jobs;
pub mod lifecycle;
pub mod put_aside;
pub mod readmodel;
pub mod scan;
pub mod sse;

pub use health::health_routes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use boxline_common::Error;
use serde_json::json;

/// Wrapper making engine errors into HTTP responses
///
/// Status mapping: unknown resources are 404, idempotency/contention
/// conflicts are 409, operations valid in form but rejected by state
/// are 422, malformed input is 400, anything else is 500. The body
/// always carries a stable `kind` for programmatic handling.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_)
            | Error::SessionAlreadyActive { .. }
            | Error::AlreadyReallocated { .. } => StatusCode::CONFLICT,
            Error::ScanningPaused { .. }
            | Error::SessionNotActive { .. }
            | Error::NoMatchingRequirement { .. }
            | Error::EmptyBox { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("API internal error: {}", self.0);
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));

        (status, body).into_response()
    }
}

/// Handler result alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;
