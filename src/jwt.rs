//! Signed, time-bound credentials.
//!
//! Access and refresh tokens are both HS256 JWTs, but each class has its own
//! secret and its own `typ` claim. A token can only be verified with the key
//! pair of the class it was issued for; anything else is `Invalid`.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Token class, also embedded in the token as the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived, never persisted.
    Access,
    /// Long-lived, the live value is stored on the user record.
    Refresh,
}

/// JWT claims shared by both token classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Unique token id, only present on refresh tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Lifetime in seconds
    pub duration: u64,
}

/// Why a token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    Expired,
    Invalid,
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("system time error")]
    TimeError,
}

impl JwtError {
    /// Classify a verification error; `None` for non-verification errors.
    pub fn failure(&self) -> Option<VerifyFailure> {
        match self {
            JwtError::Expired => Some(VerifyFailure::Expired),
            JwtError::Invalid => Some(VerifyFailure::Invalid),
            _ => None,
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Issues and verifies access and refresh tokens.
pub struct JwtConfig {
    access: KeyPair,
    refresh: KeyPair,
}

impl JwtConfig {
    /// Create a signer with the default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_lifetimes(
            access_secret,
            refresh_secret,
            DEFAULT_ACCESS_TTL,
            DEFAULT_REFRESH_TTL,
        )
    }

    pub fn with_lifetimes(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: KeyPair::new(access_secret, access_ttl),
            refresh: KeyPair::new(refresh_secret, refresh_ttl),
        }
    }

    /// Lifetime of refresh tokens in seconds, used for the cookie Max-Age.
    pub fn refresh_duration(&self) -> u64 {
        self.refresh.ttl.as_secs()
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn issue_access(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        self.issue(subject, TokenKind::Access)
    }

    /// Refresh tokens carry a random `jti`, so two tokens for the same
    /// subject never compare equal even when issued in the same second.
    pub fn issue_refresh(&self, subject: &str) -> Result<IssuedToken, JwtError> {
        self.issue(subject, TokenKind::Refresh)
    }

    fn issue(&self, subject: &str, kind: TokenKind) -> Result<IssuedToken, JwtError> {
        let keys = self.keys(kind);
        let now = unix_now()?;
        let duration = keys.ttl.as_secs();
        let exp = now + duration;

        let claims = Claims {
            sub: subject.to_string(),
            kind,
            jti: match kind {
                TokenKind::Access => None,
                TokenKind::Refresh => Some(uuid::Uuid::new_v4().to_string()),
            },
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken { token, duration })
    }

    /// Verify signature, expiry and class. Returns the claims on success.
    ///
    /// Expiry is checked against the wall clock with no leeway.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid,
            })?;

        if data.claims.kind != kind {
            return Err(JwtError::Invalid);
        }

        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(token, TokenKind::Refresh)
    }
}

fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}
