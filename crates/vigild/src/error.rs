use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use vigil_core::MatchError;

use crate::store::StoreError;

/// Registry API error taxonomy.
///
/// Validation and not-found conditions surface with distinct status codes;
/// nothing is retried.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid input")]
    InvalidInput,
    #[error("User not found")]
    UserNotFound,
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidInput => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::UserNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Match(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "store operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
