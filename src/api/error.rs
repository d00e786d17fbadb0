//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::session::SessionError;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Message plus an optional machine-readable reason code.
    Unauthorized(String, Option<&'static str>),
    Conflict(String),
    TooManyRequests(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>, code: Option<&'static str>) -> Self {
        Self::Unauthorized(msg.into(), code)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    /// Log the real cause, surface only a generic message.
    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Internal server error".into())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::BadRequest(msg) => ApiError::bad_request(msg),
            SessionError::Conflict => ApiError::conflict(e.to_string()),
            SessionError::InvalidCredentials => ApiError::unauthorized(e.to_string(), None),
            SessionError::NoRefreshToken => ApiError::unauthorized(e.to_string(), Some("NO_TOKEN")),
            SessionError::InvalidRefreshToken => {
                ApiError::unauthorized(e.to_string(), Some("INVALID"))
            }
            SessionError::UserNotFound => {
                ApiError::unauthorized(e.to_string(), Some("USER_NOT_FOUND"))
            }
            SessionError::Database(_)
            | SessionError::Token(_)
            | SessionError::Password(_)
            | SessionError::Task(_) => ApiError::internal("Session operation failed", e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Unauthorized(msg, code) => (StatusCode::UNAUTHORIZED, msg, code),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                code,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_mapping() {
        let cases = [
            (SessionError::BadRequest("x"), StatusCode::BAD_REQUEST),
            (SessionError::Conflict, StatusCode::CONFLICT),
            (SessionError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (SessionError::NoRefreshToken, StatusCode::UNAUTHORIZED),
            (SessionError::InvalidRefreshToken, StatusCode::UNAUTHORIZED),
            (
                SessionError::Database(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_internal_error_hides_cause() {
        match ApiError::internal("Failed to open thing", "secret detail at /var/db") {
            ApiError::Internal(msg) => assert_eq!(msg, "Internal server error"),
            _ => panic!("expected internal error"),
        }
    }
}
