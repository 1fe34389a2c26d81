// src/handlers/csrf.rs
use axum::{extract::State, Json};
use std::sync::Arc;

use crate::csrf::token_prefix;
use crate::error::{ApiError, ErrorBody};
use crate::models::CsrfTokenResponse;
use crate::utils::client::ClientAddress;
use crate::AppState;

/// Issue a one-time token bound to the caller's address.
#[utoipa::path(
    get,
    path = "/csrf",
    tag = "CSRF",
    responses(
        (status = 200, description = "A fresh token", body = CsrfTokenResponse),
        (status = 429, description = "Too many active tokens for this address", body = ErrorBody),
        (status = 500, description = "Token could not be stored", body = ErrorBody),
    ),
)]
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    ClientAddress(address): ClientAddress,
) -> Result<Json<CsrfTokenResponse>, ApiError> {
    let token = state.csrf_protection.issue(&address).await?;

    tracing::debug!(%address, token = token_prefix(&token), "Issued CSRF token");
    Ok(Json(CsrfTokenResponse { token }))
}
