//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Requests without a resolvable client address share one bucket.
const UNKNOWN_CLIENT: &str = "unknown";

/// Tracked keys above which idle buckets are dropped on the next check.
pub const PRUNE_THRESHOLD: usize = 10_000;

/// Tunable limits. Tests raise these so rapid requests don't trip them.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Sustained login attempts per minute per IP
    pub login_per_minute: u32,
    /// Login attempts allowed in a burst
    pub login_burst: u32,
    /// Registrations per minute per IP
    pub register_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_minute: 12,
            login_burst: 5,
            register_per_minute: 3,
        }
    }
}

impl RateLimitSettings {
    /// Limits high enough to never trigger in practice.
    pub fn relaxed() -> Self {
        Self {
            login_per_minute: 10_000,
            login_burst: 10_000,
            register_per_minute: 10_000,
        }
    }
}

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: Arc<IpLimiter>,
    pub register: Arc<IpLimiter>,
    /// Key on `X-Forwarded-For` instead of the peer address
    pub trust_forwarded: bool,
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

impl RateLimitConfig {
    pub fn new(settings: RateLimitSettings, trust_forwarded: bool) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_minute(non_zero(settings.login_per_minute))
                    .allow_burst(non_zero(settings.login_burst)),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(non_zero(
                settings.register_per_minute,
            )))),
            trust_forwarded,
        }
    }

    fn client_key(&self, request: &Request) -> String {
        extract_client_ip(request, self.trust_forwarded)
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Check `key` against `limiter`, first forgetting buckets that have fully
/// refilled once the key set grows past [`PRUNE_THRESHOLD`]. Forwarded
/// addresses are client-controlled, so the key set is unbounded otherwise.
fn check(limiter: &IpLimiter, key: &String) -> bool {
    if limiter.len() > PRUNE_THRESHOLD {
        limiter.retain_recent();
        limiter.shrink_to_fit();
    }
    limiter.check_key(key).is_ok()
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);

    if check(&config.login, &key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Login rate limit exceeded");
        ApiError::too_many_requests("Too many login attempts. Please wait before trying again.")
            .into_response()
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);

    if check(&config.register, &key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Registration rate limit exceeded");
        ApiError::too_many_requests("Too many signup attempts. Please wait before trying again.")
            .into_response()
    }
}
