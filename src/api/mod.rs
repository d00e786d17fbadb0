mod admin;
mod auth;
mod error;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionService;

pub use auth::{AccessTokenResponse, MeResponse, SessionResponse};
pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    secure_cookies: bool,
    allow_admin_registration: bool,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        db: db.clone(),
        jwt: jwt.clone(),
        sessions: SessionService::new(db.clone(), jwt.clone(), allow_admin_registration),
        secure_cookies,
        rate_limit_config,
    };

    let admin_state = admin::AdminState { db, jwt };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/admin", admin::router(admin_state))
        .fallback(not_found)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
