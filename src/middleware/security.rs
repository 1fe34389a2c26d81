// src/middleware/security.rs - Response hardening, CORS and referrer policy
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{Config, DEFAULT_ALLOWED_ORIGIN};
use crate::csrf::CSRF_TOKEN_HEADER;
use crate::error::ApiError;
use crate::AppState;

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; script-src 'self' 'unsafe-inline' 'unsafe-eval'; style-src 'self' 'unsafe-inline';";

const PERMISSIONS_POLICY: &str =
    "accelerometer=(), camera=(), geolocation=(), gyroscope=(), magnetometer=(), microphone=(), payment=(), usb=()";

/// Paths that stay reachable without a referrer.
const REFERRER_EXEMPT_PATHS: &[&str] = &["/docs", "/openapi.json", "/health"];

pub async fn security_headers(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer-when-downgrade"),
    );
    // Handlers may set a looser policy of their own
    headers
        .entry(header::CONTENT_SECURITY_POLICY)
        .or_insert(HeaderValue::from_static(CONTENT_SECURITY_POLICY));
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static(PERMISSIONS_POLICY),
    );

    // Only meaningful once served over HTTPS
    if state.config.environment.is_production() {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
        );
    }

    headers.remove(header::SERVER);

    response
}

/// CORS for the configured origins plus the local frontend.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring origin that is not a valid header value");
                None
            }
        })
        .collect();

    let local = HeaderValue::from_static(DEFAULT_ALLOWED_ORIGIN);
    if !origins.contains(&local) {
        origins.push(local);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static(CSRF_TOKEN_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(24 * 60 * 60))
}

/// True when the referrer's host:port equals that of an allowed origin.
fn referrer_allowed(referrer: &str, allowed_origins: &[String]) -> bool {
    let Ok(referrer) = url::Url::parse(referrer) else {
        return false;
    };

    allowed_origins.iter().any(|origin| {
        url::Url::parse(origin)
            .map(|origin| {
                origin.host_str() == referrer.host_str()
                    && origin.port_or_known_default() == referrer.port_or_known_default()
            })
            .unwrap_or(false)
    })
}

/// In production, only serve requests coming from pages of an allowed origin.
pub async fn referrer_check(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let config = &state.config;
    let path = request.uri().path();

    if !config.environment.is_production() || REFERRER_EXEMPT_PATHS.contains(&path) {
        return Ok(next.run(request).await);
    }

    // Preflights carry no referrer in some browsers
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let referrer = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());

    match referrer {
        None => {
            tracing::warn!(%path, method = %request.method(), "No referrer provided");
            Err(ApiError::AccessDenied)
        }
        Some(referrer) if !referrer_allowed(referrer, &config.allowed_origins) => {
            tracing::warn!(%referrer, %path, method = %request.method(), "Invalid referrer");
            Err(ApiError::AccessDenied)
        }
        Some(referrer) => {
            tracing::debug!(%referrer, %path, "Referrer check passed");
            Ok(next.run(request).await)
        }
    }
}
