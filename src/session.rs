//! Session lifecycle: registration, login, refresh-token rotation, logout.
//!
//! The session state of an account lives entirely in its stored
//! `refresh_token` column: NULL means no session, any other value is the one
//! live refresh token. This service is the only writer of that column.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::db::{Database, NewUser, User, UserRole, UserSummary};
use crate::jwt::{IssuedToken, JwtConfig, JwtError};
use crate::password::{self, PasswordError};

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("User already exists")]
    Conflict,
    /// Unknown email and wrong password are deliberately the same error.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("No refresh token provided")]
    NoRefreshToken,
    /// Refresh token failed verification, is stale, revoked, or its subject
    /// no longer exists.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("User not found")]
    UserNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Token(#[from] JwtError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Registration input as received from the client.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub role: Option<&'a str>,
}

/// An access/refresh pair minted together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Result of a successful register or login.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub user: UserSummary,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct SessionService {
    db: Database,
    jwt: Arc<JwtConfig>,
    allow_admin_registration: bool,
}

impl SessionService {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, allow_admin_registration: bool) -> Self {
        Self {
            db,
            jwt,
            allow_admin_registration,
        }
    }

    /// Only the exact literal `ADMIN` is honored, and only when admin
    /// registration is enabled.
    fn resolve_role(&self, requested: Option<&str>) -> UserRole {
        match requested {
            Some("ADMIN") if self.allow_admin_registration => UserRole::Admin,
            _ => UserRole::User,
        }
    }

    pub async fn register(&self, input: Registration<'_>) -> Result<SessionGrant, SessionError> {
        let name = input.name.trim();
        let email = input.email.trim().to_lowercase();

        if name.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(SessionError::BadRequest(
                "Please provide all required fields",
            ));
        }

        if !is_valid_email(&email) {
            return Err(SessionError::BadRequest(
                "Please provide a valid email address",
            ));
        }

        if input.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(SessionError::BadRequest(
                "Password must be at least 8 characters long",
            ));
        }

        if !self.db.users().is_email_available(&email).await? {
            return Err(SessionError::Conflict);
        }

        let role = self.resolve_role(input.role);
        let plaintext = input.password.to_owned();
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&plaintext)).await??;

        let uuid = uuid::Uuid::new_v4().to_string();
        let new_user = NewUser {
            uuid: &uuid,
            name,
            email: &email,
            password_hash: &password_hash,
            role,
        };

        // The availability check above can race with a concurrent signup.
        if let Err(e) = self.db.users().create(&new_user).await {
            return Err(match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    SessionError::Conflict
                }
                other => SessionError::Database(other),
            });
        }

        let user = self
            .db
            .users()
            .get_by_uuid(&uuid)
            .await?
            .ok_or(SessionError::UserNotFound)?;

        let grant = self.start_session(&user).await?;
        info!(user = %user.uuid, role = role.as_str(), "User registered");
        Ok(grant)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionGrant, SessionError> {
        let email = email.trim().to_lowercase();

        if email.is_empty() || password.is_empty() {
            return Err(SessionError::BadRequest(
                "Please provide email and password",
            ));
        }

        let plaintext = password.to_owned();
        let Some(user) = self.db.users().get_by_email(&email).await? else {
            tokio::task::spawn_blocking(move || password::verify_dummy(&plaintext)).await?;
            debug!("Login attempt for unknown email");
            return Err(SessionError::InvalidCredentials);
        };

        let hash = user.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&plaintext, &hash))
                .await??;
        if !matches {
            debug!(user = %user.uuid, "Login attempt with wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        let grant = self.start_session(&user).await?;
        info!(user = %user.uuid, "User logged in");
        Ok(grant)
    }

    /// Issue a fresh pair and make its refresh token the live one.
    async fn start_session(&self, user: &User) -> Result<SessionGrant, SessionError> {
        let tokens = self.issue_pair(&user.uuid)?;

        if !self
            .db
            .users()
            .set_refresh_token(&user.uuid, Some(&tokens.refresh.token))
            .await?
        {
            return Err(SessionError::UserNotFound);
        }

        Ok(SessionGrant {
            user: UserSummary::from(user),
            tokens,
        })
    }

    fn issue_pair(&self, subject: &str) -> Result<TokenPair, SessionError> {
        Ok(TokenPair {
            access: self.jwt.issue_access(subject)?,
            refresh: self.jwt.issue_refresh(subject)?,
        })
    }

    /// Rotate a refresh token.
    ///
    /// The presented token must verify and equal the stored value. The store
    /// write is a compare-and-swap on that value, so when two callers race
    /// with the same token the loser fails here instead of overwriting the
    /// winner's token.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair, SessionError> {
        let presented = presented
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::NoRefreshToken)?;

        let claims = self.jwt.verify_refresh(presented).map_err(|e| {
            debug!(error = %e, "Refresh token failed verification");
            SessionError::InvalidRefreshToken
        })?;

        let user = self
            .db
            .users()
            .get_by_uuid(&claims.sub)
            .await?
            .ok_or(SessionError::InvalidRefreshToken)?;

        if user.refresh_token.as_deref() != Some(presented) {
            warn!(user = %user.uuid, "Stale or revoked refresh token presented");
            return Err(SessionError::InvalidRefreshToken);
        }

        let tokens = self.issue_pair(&user.uuid)?;

        let rotated = self
            .db
            .users()
            .rotate_refresh_token(&user.uuid, presented, &tokens.refresh.token)
            .await?;
        if !rotated {
            warn!(user = %user.uuid, "Lost refresh token rotation race");
            return Err(SessionError::InvalidRefreshToken);
        }

        debug!(user = %user.uuid, "Refresh token rotated");
        Ok(tokens)
    }

    /// Clear the stored refresh token. Idempotent; unknown subjects are fine.
    pub async fn logout(&self, subject: &str) -> Result<(), SessionError> {
        self.db.users().set_refresh_token(subject, None).await?;
        info!(user = %subject, "User logged out");
        Ok(())
    }

    pub async fn whoami(&self, subject: &str) -> Result<UserSummary, SessionError> {
        self.db
            .users()
            .get_by_uuid(subject)
            .await?
            .map(|user| UserSummary::from(&user))
            .ok_or(SessionError::UserNotFound)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}
