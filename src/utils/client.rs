// src/utils/client.rs - Client address resolution
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::AppState;

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the address a request originated from.
///
/// Behind a reverse proxy the first `X-Forwarded-For` entry (or `X-Real-IP`)
/// is the client; otherwise the socket peer is used.
pub fn resolve_client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Extractor yielding the resolved client address.
#[derive(Debug, Clone)]
pub struct ClientAddress(pub String);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ClientAddress {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self(resolve_client_address(
            &parts.headers,
            peer,
            state.config.trust_proxy_headers,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.7:51234".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(resolve_client_address(&headers, peer(), true), "203.0.113.1");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(resolve_client_address(&headers, peer(), true), "198.51.100.2");
    }

    #[test]
    fn test_untrusted_headers_use_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(resolve_client_address(&headers, peer(), false), "192.0.2.7");
        assert_eq!(resolve_client_address(&headers, None, false), UNKNOWN_CLIENT);
    }
}
