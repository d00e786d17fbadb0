//! Refresh token cookie: the side channel that keeps the token away from
//! page scripts and out of response bodies.

use axum::http::header;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// The cookie is only sent to the auth endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

/// Build the Set-Cookie value carrying a refresh token.
pub fn refresh_cookie(token: &str, max_age: u64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}{}",
        REFRESH_COOKIE_NAME,
        token,
        REFRESH_COOKIE_PATH,
        max_age,
        secure_attr(secure)
    )
}

/// Build the Set-Cookie value that deletes the refresh token cookie.
pub fn clear_refresh_cookie(secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0{}",
        REFRESH_COOKIE_NAME,
        REFRESH_COOKIE_PATH,
        secure_attr(secure)
    )
}

fn secure_attr(secure: bool) -> &'static str {
    if secure { "; Secure" } else { "" }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("refresh_token=abc123"),
        );

        assert_eq!(get_cookie(&headers, "refresh_token"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; refresh_token=xyz789; theme=dark"),
        );

        assert_eq!(get_cookie(&headers, "refresh_token"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
        assert_eq!(get_cookie(&headers, "theme"), Some("dark"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, "refresh_token"), None);
        assert_eq!(get_cookie(&axum::http::HeaderMap::new(), "refresh_token"), None);
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = refresh_cookie("tok", 604800, false);
        assert!(cookie.starts_with("refresh_token=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Path=/api/auth"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));

        assert!(refresh_cookie("tok", 60, true).ends_with("; Secure"));
    }

    #[test]
    fn test_clear_refresh_cookie() {
        let cookie = clear_refresh_cookie(true);
        assert!(cookie.starts_with("refresh_token=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Path=/api/auth"));
        assert!(cookie.contains("Secure"));
    }
}
