#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use serde_json::Value;
use ticketdesk::{
    ServerConfig,
    db::Database,
    jwt::{Claims, JwtConfig, TokenKind},
    rate_limit::RateLimitSettings,
};

pub const ACCESS_SECRET: &[u8] = b"integration-access-secret-000000000";
pub const REFRESH_SECRET: &[u8] = b"integration-refresh-secret-00000000";

pub const PASSWORD: &str = "longenough1";

/// Server config over a fresh in-memory database, with rate limits that
/// won't trip during a test.
pub async fn test_config() -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = ServerConfig::new(db, ACCESS_SECRET.to_vec(), REFRESH_SECRET.to_vec());
    config.rate_limits = RateLimitSettings::relaxed();
    config
}

pub async fn create_test_app() -> (Router, Database) {
    let config = test_config().await;
    (ticketdesk::create_app(&config), config.db.clone())
}

pub fn create_jwt() -> JwtConfig {
    JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET)
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A correctly signed access token whose expiry has passed.
pub fn expired_access_token(subject: &str) -> String {
    let now = unix_now();
    let claims = Claims {
        sub: subject.to_string(),
        kind: TokenKind::Access,
        jti: None,
        iat: now - 120,
        exp: now - 60,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(ACCESS_SECRET),
    )
    .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn cookie_request(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// The Set-Cookie header of a response, if any.
pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The `name=value` pair of a Set-Cookie header, usable as a Cookie header.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie
        .split_once(';')
        .map(|(pair, _)| pair)
        .unwrap_or(set_cookie)
        .trim()
        .to_string()
}

/// Register through the API. Returns the response body and the refresh
/// cookie as a Cookie header value.
pub async fn register(app: &Router, email: &str, role: Option<&str>) -> (Value, String) {
    use tower::ServiceExt;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "name": "A",
                "email": email,
                "password": PASSWORD,
                "role": role,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201, "registration of {email} failed");

    let cookie = cookie_pair(&set_cookie(&response).expect("register sets refresh cookie"));
    (body_json(response).await, cookie)
}
