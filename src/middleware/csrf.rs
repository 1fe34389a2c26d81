// src/middleware/csrf.rs - Request gate for state-changing methods
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::csrf::{token_prefix, CsrfError, CSRF_TOKEN_HEADER};
use crate::error::ApiError;
use crate::utils::client::ClientAddress;
use crate::AppState;

fn requires_token(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Reject mutating requests that do not carry a fresh, unused token.
///
/// The token is consumed before the handler runs, so a request that later
/// fails still burns its token.
pub async fn csrf_gate(
    State(state): State<Arc<AppState>>,
    ClientAddress(address): ClientAddress,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !requires_token(request.method()) {
        return Ok(next.run(request).await);
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let token = request
        .headers()
        .get(CSRF_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let Some(token) = token else {
        tracing::warn!(%method, %path, %address, "CSRF token missing");
        return Err(CsrfError::MissingToken.into());
    };

    if let Err(err) = state.csrf_protection.validate(&token, &address).await {
        if err.status().is_server_error() {
            tracing::error!(
                %method, %path, %address,
                token = token_prefix(&token),
                code = err.code(),
                error = ?err,
                "CSRF validation failed"
            );
        } else {
            tracing::warn!(
                %method, %path, %address,
                token = token_prefix(&token),
                code = err.code(),
                "CSRF validation failed"
            );
        }
        return Err(err.into());
    }

    tracing::debug!(%method, %path, token = token_prefix(&token), "CSRF token validated and consumed");
    Ok(next.run(request).await)
}
