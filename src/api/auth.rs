//! Session endpoints.
//!
//! - POST `/register` - Create an account and start a session
//! - POST `/login` - Start a session with email and password
//! - POST `/refresh-token` - Rotate the refresh cookie, mint a new access token
//! - POST `/logout` - End the session and clear the refresh cookie
//! - GET `/me` - Identity of the bearer

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{Auth, REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie};
use crate::db::{Database, UserSummary};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::session::{Registration, SessionGrant, SessionService};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub sessions: SessionService,
    pub secure_cookies: bool,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(session_router)
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
    role: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct LoginRequest {
    email: String,
    password: String,
}

/// Body of register and login responses. The refresh token travels only in
/// the cookie.
#[derive(Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: UserSummary,
    pub access_token: String,
}

#[derive(Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserSummary,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

impl AuthState {
    fn session_cookie(&self, refresh_token: &str) -> String {
        refresh_cookie(refresh_token, self.jwt.refresh_duration(), self.secure_cookies)
    }

    fn session_response(&self, status: StatusCode, grant: SessionGrant) -> Response {
        let cookie = self.session_cookie(&grant.tokens.refresh.token);
        (
            status,
            [(SET_COOKIE, cookie)],
            Json(SessionResponse {
                user: grant.user,
                access_token: grant.tokens.access.token,
            }),
        )
            .into_response()
    }
}

async fn register(
    State(state): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;

    let grant = state
        .sessions
        .register(Registration {
            name: &payload.name,
            email: &payload.email,
            password: &payload.password,
            role: payload.role.as_deref(),
        })
        .await?;

    Ok(state.session_response(StatusCode::CREATED, grant))
}

async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;

    let grant = state
        .sessions
        .login(&payload.email, &payload.password)
        .await?;

    Ok(state.session_response(StatusCode::OK, grant))
}

/// Exchange the refresh cookie for a new pair. The old refresh token is dead
/// afterwards. A rejected refresh leaves the cookie alone, since another
/// request sharing the cookie jar may already hold its replacement.
async fn refresh_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let presented = get_cookie(&headers, REFRESH_COOKIE_NAME);
    let tokens = state.sessions.refresh(presented).await?;

    let cookie = state.session_cookie(&tokens.refresh.token);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(AccessTokenResponse {
            access_token: tokens.access.token,
        }),
    )
        .into_response())
}

async fn logout(State(state): State<AuthState>, auth: Auth) -> Result<Response, ApiError> {
    state.sessions.logout(&auth.user.id).await?;

    Ok((
        [(SET_COOKIE, clear_refresh_cookie(state.secure_cookies))],
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
        .into_response())
}

async fn me(State(state): State<AuthState>, auth: Auth) -> Result<Json<MeResponse>, ApiError> {
    let user = state.sessions.whoami(&auth.user.id).await?;
    Ok(Json(MeResponse { user }))
}
