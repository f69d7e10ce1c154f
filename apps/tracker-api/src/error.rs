use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// Application-level error type that converts into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Gateway ingestion errors
// ---------------------------------------------------------------------------

/// Why an inbound position update was rejected. Each error is scoped to the
/// one message; the sending session stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Malformed, incomplete, or out-of-range payload. Nothing was stored.
    InvalidPayload(String),
    /// The sending session is a viewer.
    NotResponder,
    /// The session is not (or no longer) registered.
    UnknownSession,
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidPayload(_) => crate::gateway::events::ERROR_INVALID_PAYLOAD,
            IngestError::NotResponder => crate::gateway::events::ERROR_NOT_RESPONDER,
            IngestError::UnknownSession => "UNKNOWN_SESSION",
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        IngestError::InvalidPayload(message.into())
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::InvalidPayload(reason) => write!(f, "invalid payload: {reason}"),
            IngestError::NotResponder => f.write_str("only responder sessions may publish positions"),
            IngestError::UnknownSession => f.write_str("unknown session"),
        }
    }
}

impl std::error::Error for IngestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_error_codes() {
        assert_eq!(IngestError::invalid("x").code(), "INVALID_PAYLOAD");
        assert_eq!(IngestError::NotResponder.code(), "NOT_RESPONDER");
        assert_eq!(
            IngestError::invalid("lat out of range").to_string(),
            "invalid payload: lat out of range"
        );
    }

    #[test]
    fn api_error_status() {
        let response = ApiError::not_found("Responder not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
