//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Why the authentication gate rejected a request.
///
/// `TokenExpired` is kept distinct from `InvalidToken`: it is the signal that
/// tells a client to refresh and retry rather than log in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    NoCredential,
    TokenExpired,
    InvalidToken,
    UserNotFound,
    InsufficientRole,
    DatabaseError,
}

impl AuthErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoCredential | Self::TokenExpired | Self::InvalidToken | Self::UserNotFound => {
                StatusCode::UNAUTHORIZED
            }
            Self::InsufficientRole => StatusCode::FORBIDDEN,
            Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason sent as `code`.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NoCredential => Some("NO_CREDENTIAL"),
            Self::TokenExpired => Some("TOKEN_EXPIRED"),
            Self::InvalidToken => Some("INVALID_TOKEN"),
            Self::UserNotFound => Some("USER_NOT_FOUND"),
            Self::InsufficientRole => Some("FORBIDDEN"),
            Self::DatabaseError => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::NoCredential => "No token provided",
            Self::TokenExpired => "Token expired",
            Self::InvalidToken => "Invalid token",
            Self::UserNotFound => "User not found",
            Self::InsufficientRole => "Admin access required",
            Self::DatabaseError => "Internal server error",
        }
    }
}

/// API authentication error, rendered as JSON.
#[derive(Debug)]
pub struct ApiAuthError(pub AuthErrorKind);

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self(kind)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        (
            self.0.status_code(),
            Json(ErrorResponse {
                error: self.0.message(),
                code: self.0.code(),
            }),
        )
            .into_response()
    }
}
