//! Axum extractors for authentication.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;
use crate::db::UserRole;
use crate::jwt::VerifyFailure;

/// Extract the bearer credential from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Core authentication gate.
///
/// Verifies the access token (signature and expiry only) and resolves the
/// account it names. An account deleted since the token was issued is
/// rejected.
pub async fn authenticate<S>(
    headers: &HeaderMap,
    state: &S,
) -> Result<AuthenticatedUser, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = bearer_token(headers).ok_or(AuthErrorKind::NoCredential)?;

    let claims = state
        .jwt()
        .verify_access(token)
        .map_err(|e| match e.failure() {
            Some(VerifyFailure::Expired) => AuthErrorKind::TokenExpired,
            _ => AuthErrorKind::InvalidToken,
        })?;

    let user = state
        .db()
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get user: {}", e);
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::UserNotFound)?;

    Ok(AuthenticatedUser {
        id: user.uuid,
        role: user.role,
    })
}

/// Role requirement checked after authentication succeeds.
pub trait RoleConstraint: Send + Sync + 'static {
    fn allows(role: UserRole) -> bool;
}

/// Any authenticated account.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: UserRole) -> bool {
        true
    }
}

/// Accounts with the `ADMIN` role only; everyone else gets 403.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role == UserRole::Admin
    }
}

/// Extractor for API endpoints that require authentication.
/// Returns JSON errors with a machine-readable `code`.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub user: AuthenticatedUser,
    _role: PhantomData<fn() -> R>,
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = authenticate(&parts.headers, state).await?;

        if !R::allows(user.role) {
            tracing::debug!(user = %user.id, "Rejected request with insufficient role");
            return Err(AuthErrorKind::InsufficientRole.into());
        }

        Ok(Auth {
            user,
            _role: PhantomData,
        })
    }
}
