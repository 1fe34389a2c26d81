// src/handlers/health.rs
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::models::HealthResponse;
use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let environment = state.config.environment.to_string();

    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "ok",
                environment,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unavailable",
                    environment,
                }),
            )
        }
    }
}
