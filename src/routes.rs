// src/routes.rs
use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::handlers::{csrf, docs, health, pokemon, tasks};
use crate::middleware::{
    csrf::csrf_gate,
    logging::request_logging,
    rate_limit::rate_limit,
    security::{cors_layer, referrer_check, security_headers},
};
use crate::AppState;

async fn not_found() -> ApiError {
    ApiError::NotFound {
        code: "NOT_FOUND",
        message: "Route not found",
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    ApiError::Internal(detail).into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/csrf", get(csrf::issue_token))
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/pokemon", get(pokemon::list_pokemon))
        .route("/pokemon/:id", get(pokemon::get_pokemon));

    let cors = cors_layer(&state.config);

    Router::new()
        .nest(&state.config.api_prefix(), api)
        .route("/csrf", get(csrf::issue_token))
        .route("/openapi.json", get(docs::openapi_json))
        .route("/docs", get(docs::docs_page))
        .route("/health", get(health::health_check))
        .fallback(not_found)
        // Innermost first
        .layer(from_fn_with_state(state.clone(), csrf_gate))
        .layer(from_fn_with_state(state.clone(), referrer_check))
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(from_fn_with_state(state.clone(), security_headers))
        .layer(cors)
        .layer(from_fn(request_logging))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
