//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, MIN_SECRET_LENGTH};
use crate::rate_limit::RateLimitSettings;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Environment variable holding the access token secret.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// Environment variable holding the refresh token secret.
pub const JWT_REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ticketdesk",
    about = "Session and token service for the support ticket desk"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "ticketdesk.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the JWT_SECRET env var
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the JWT_REFRESH_SECRET env var
    #[arg(long)]
    pub jwt_refresh_secret_file: Option<String>,

    /// Access token lifetime (e.g. 900s, 15m, 1h)
    #[arg(long, env = "ACCESS_TOKEN_TTL", default_value = "15m", value_parser = parse_duration)]
    pub access_ttl: Duration,

    /// Refresh token lifetime (e.g. 12h, 7d)
    #[arg(long, env = "REFRESH_TOKEN_TTL", default_value = "7d", value_parser = parse_duration)]
    pub refresh_ttl: Duration,

    /// Set the Secure flag on the refresh cookie (enable behind HTTPS)
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Browser origin allowed to call the API with credentials
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000", value_parser = validate_origin)]
    pub cors_origin: String,

    /// Ignore role requests at registration; every new account is a plain user
    #[arg(long)]
    pub no_admin_signup: bool,

    /// Key rate limits on X-Forwarded-For (only when running behind a reverse proxy)
    #[arg(long)]
    pub trust_forwarded: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Parse a duration with an `s`, `m`, `h` or `d` suffix. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, "s"),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: {}", s))?;

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(format!("Unknown duration unit in {}: use s, m, h or d", s)),
    };

    let secs = value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Duration too large: {}", s))?;

    if secs == 0 {
        return Err("Duration must be greater than zero".to_string());
    }

    Ok(Duration::from_secs(secs))
}

/// Accept only an `http(s)://host[:port]` origin, normalized without a
/// trailing slash.
fn validate_origin(s: &str) -> Result<String, String> {
    let url = Url::parse(s).map_err(|e| format!("Invalid origin {}: {}", s, e))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("Origin must use http or https: {}", s));
    }

    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(format!("Origin has no host: {}", s));
    }

    Ok(origin.ascii_serialization())
}

/// Initialize logging based on the specified format.
/// The level filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .init(),
    }
}

/// Load a signing secret from an environment variable or a file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            variable = %env_var,
            "Secret is required. Set the environment variable (recommended) or pass the matching --*-secret-file flag"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            variable = %env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets. They must differ, otherwise a refresh token
/// would verify under the access key material.
pub fn load_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_secret(JWT_SECRET_ENV, args.jwt_secret_file.as_deref())?;
    let refresh = load_secret(JWT_REFRESH_SECRET_ENV, args.jwt_refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("JWT_SECRET and JWT_REFRESH_SECRET must be different");
        return None;
    }

    Some((access, refresh))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    jwt_secret: String,
    jwt_refresh_secret: String,
) -> ServerConfig {
    if args.access_ttl >= args.refresh_ttl {
        tracing::warn!(
            access = ?args.access_ttl,
            refresh = ?args.refresh_ttl,
            "Access token lifetime is not shorter than refresh token lifetime"
        );
    }

    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        jwt_refresh_secret: jwt_refresh_secret.into_bytes(),
        access_ttl: args.access_ttl,
        refresh_ttl: args.refresh_ttl,
        secure_cookies: args.secure_cookies,
        allow_admin_registration: !args.no_admin_signup,
        cors_origin: Some(args.cors_origin.clone()),
        rate_limits: RateLimitSettings::default(),
        trust_forwarded: args.trust_forwarded,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
