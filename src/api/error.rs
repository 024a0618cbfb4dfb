use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("malformed JSON body: {0}")]
    Body(#[from] JsonRejection),

    #[error("malformed query string: {0}")]
    Query(#[from] QueryRejection),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Status, short message and what the caller can do about it.
    fn classify(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            ApiError::Engine(e) => match e {
                EngineError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "Resource not found",
                    "Check the id and try again.",
                ),
                EngineError::ProfessionalNotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "Professional not found",
                    "Check the professional id.",
                ),
                EngineError::SlotUnavailable(_) => (
                    StatusCode::BAD_REQUEST,
                    "Slot not valid or already taken",
                    "Reload the available slots and pick another time.",
                ),
                EngineError::NotConfigured(_) => (
                    StatusCode::BAD_REQUEST,
                    "Professional is not accepting bookings",
                    "The professional must set an appointment duration and timezone first.",
                ),
                EngineError::Overlap { .. } => (
                    StatusCode::BAD_REQUEST,
                    "Availability overlaps an existing range",
                    "Adjust the times so ranges on the same day do not overlap.",
                ),
                EngineError::InvalidRule(_) => (
                    StatusCode::BAD_REQUEST,
                    "Availability start must be before end",
                    "Send a start time earlier than the end time.",
                ),
                EngineError::InvalidInput(_) | EngineError::LimitExceeded(_) => (
                    StatusCode::BAD_REQUEST,
                    "Validation error",
                    "Correct the request and retry.",
                ),
                EngineError::Forbidden(_) => (
                    StatusCode::FORBIDDEN,
                    "Access denied",
                    "Only the owner may perform this action.",
                ),
                EngineError::WalError(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred",
                    "Retry later.",
                ),
            },
            ApiError::Validation(_) | ApiError::Body(_) | ApiError::Query(_) => (
                StatusCode::BAD_REQUEST,
                "Validation error",
                "Correct the request and retry.",
            ),
            ApiError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "Authentication required",
                "Send X-User-Id and X-User-Role headers.",
            ),
            ApiError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                "Access denied",
                "Use an account with the required role.",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, action) = self.classify();

        // Storage failures are logged in full and never echoed back.
        let details = if status.is_server_error() {
            error!("request failed: {self}");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "details": details,
                "action": action,
            }
        }));

        (status, body).into_response()
    }
}
