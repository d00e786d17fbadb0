//! Admin API endpoints.
//!
//! All endpoints require admin role.

use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{AdminOnly, Auth};
use crate::db::{Database, UserSummary};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

/// State for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .with_state(state)
}

/// List every account as an identity summary.
async fn list_users(
    State(state): State<AdminState>,
    auth: Auth<AdminOnly>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state
        .db
        .users()
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to list users", e))?;

    tracing::debug!(admin = %auth.user.id, count = users.len(), "Listed users");
    Ok(Json(users))
}
