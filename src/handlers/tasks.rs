// src/handlers/tasks.rs
use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::{header, StatusCode},
    Form, Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ErrorBody};
use crate::models::{CreateTaskRequest, Task, UpdateTaskRequest};
use crate::AppState;

const TASK_NOT_FOUND: ApiError = ApiError::NotFound {
    code: "TASK_NOT_FOUND",
    message: "Task not found",
};

/// Request body accepted as either JSON or a urlencoded form.
pub struct TaskPayload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for TaskPayload<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.contains("application/json") {
            let Json(body) = Json::<T>::from_request(req, state).await.map_err(|e| {
                tracing::warn!(error = %e, "Failed to parse JSON body");
                ApiError::unparsable_body()
            })?;
            Ok(Self(body))
        } else if content_type.contains("application/x-www-form-urlencoded") {
            let Form(body) = Form::<T>::from_request(req, state).await.map_err(|e| {
                tracing::warn!(error = %e, "Failed to parse form body");
                ApiError::unparsable_body()
            })?;
            Ok(Self(body))
        } else {
            Err(ApiError::UnsupportedMediaType)
        }
    }
}

fn parse_task_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| {
        tracing::warn!(task_id = %id, "Task not found");
        TASK_NOT_FOUND
    })
}

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    responses(
        (status = 200, description = "All tasks", body = [Task]),
    ),
)]
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<Task>> {
    let tasks = state.tasks.list().await;
    tracing::debug!(count = tasks.len(), "Returning task list");
    Json(tasks)
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "The task", body = Task),
        (status = 404, description = "Task not found", body = ErrorBody),
    ),
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_task_id(&id)?;

    match state.tasks.get(&id).await {
        Some(task) => Ok(Json(task)),
        None => {
            tracing::warn!(task_id = %id, "Task not found");
            Err(TASK_NOT_FOUND)
        }
    }
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    security(("csrf" = [])),
    request_body(
        description = "Task to create, as JSON or a urlencoded form",
        content(
            (CreateTaskRequest = "application/json"),
            (CreateTaskRequest = "application/x-www-form-urlencoded"),
        ),
    ),
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid request data", body = ErrorBody),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorBody),
        (status = 415, description = "Unsupported content type", body = ErrorBody),
    ),
)]
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    TaskPayload(mut payload): TaskPayload<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    payload.title = payload.title.trim().to_string();
    payload.validate()?;

    let task = state.tasks.create(payload.title).await;
    tracing::info!(task_id = %task.id, title = %task.title, "Task created");

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    patch,
    path = "/tasks/{id}",
    tag = "Tasks",
    security(("csrf" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    request_body(
        description = "Fields to change, as JSON or a urlencoded form",
        content(
            (UpdateTaskRequest = "application/json"),
            (UpdateTaskRequest = "application/x-www-form-urlencoded"),
        ),
    ),
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid request data", body = ErrorBody),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorBody),
        (status = 404, description = "Task not found", body = ErrorBody),
    ),
)]
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    TaskPayload(mut payload): TaskPayload<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    payload.title = payload.title.map(|t| t.trim().to_string());
    payload.validate()?;

    let id = parse_task_id(&id)?;
    let changed_title = payload.title.is_some();
    let changed_completed = payload.completed;

    match state.tasks.update(&id, payload).await {
        Some(task) => {
            tracing::info!(
                task_id = %id,
                changed_title,
                completed = ?changed_completed,
                "Task updated"
            );
            Ok(Json(task))
        }
        None => {
            tracing::warn!(task_id = %id, "Task not found for update");
            Err(TASK_NOT_FOUND)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "Tasks",
    security(("csrf" = [])),
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Missing or invalid CSRF token", body = ErrorBody),
        (status = 404, description = "Task not found", body = ErrorBody),
    ),
)]
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_task_id(&id)?;

    if state.tasks.delete(&id).await {
        tracing::info!(task_id = %id, "Task deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        tracing::warn!(task_id = %id, "Task not found for deletion");
        Err(TASK_NOT_FOUND)
    }
}
