//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;

/// Access to HTTP headers and extensions for IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// With `trust_forwarded` set (running behind a reverse proxy), the first
/// address of `X-Forwarded-For` wins. Otherwise, and as a fallback, the peer
/// address from `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_forwarded: bool,
) -> Option<String> {
    if trust_forwarded {
        let forwarded = source
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }

    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(forwarded: Option<&str>, peer: Option<&str>) -> axum::extract::Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            request
                .extensions_mut()
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        request
    }

    #[test]
    fn test_forwarded_ignored_unless_trusted() {
        let req = request(Some("10.0.0.1"), Some("127.0.0.1:5000"));
        assert_eq!(extract_client_ip(&req, false).as_deref(), Some("127.0.0.1"));
        assert_eq!(extract_client_ip(&req, true).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_forwarded_takes_first_address() {
        let req = request(Some(" 10.0.0.1 , 10.0.0.2"), None);
        assert_eq!(extract_client_ip(&req, true).as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_no_ip_available() {
        let req = request(None, None);
        assert_eq!(extract_client_ip(&req, true), None);
    }
}
