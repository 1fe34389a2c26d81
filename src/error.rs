// src/error.rs - API error type and its JSON rendering
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::csrf::CsrfError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Error body shared by every failing response.
#[derive(Debug, Serialize, ToSchema)]
#[schema(as = Error)]
pub struct ErrorBody {
    #[schema(value_type = String, example = "CSRF_TOKEN_MISSING")]
    pub code: &'static str,
    pub message: String,
    /// Field errors for validation failures, reset time for rate limiting.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    #[error("Invalid request data")]
    Validation(Vec<FieldError>),

    #[error("Unsupported content type. Use application/json or application/x-www-form-urlencoded")]
    UnsupportedMediaType,

    #[error("{message}")]
    NotFound { code: &'static str, message: &'static str },

    #[error("Too many requests")]
    TooManyRequests { reset_at: i64 },

    #[error("Access denied")]
    AccessDenied,

    #[error("{message}")]
    Upstream { code: &'static str, message: &'static str },

    #[error("An unexpected error occurred")]
    Internal(String),

    #[error(transparent)]
    Csrf(#[from] CsrfError),
}

impl ApiError {
    pub fn unparsable_body() -> Self {
        Self::BadRequest {
            code: "INVALID_BODY",
            message: "Could not parse request body".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::Upstream { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Csrf(err) => err.status(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. } => *code,
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::NotFound { code, .. } => *code,
            Self::TooManyRequests { .. } => "RATE_LIMITED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::Upstream { code, .. } => *code,
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
            Self::Csrf(err) => err.code(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Validation(fields) => Some(json!(fields)),
            Self::TooManyRequests { reset_at } => Some(json!({ "resetAt": reset_at })),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| FieldError {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string()),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        Self::Validation(fields)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            match &self {
                Self::Internal(detail) => tracing::error!(code = self.code(), %detail, "Request failed"),
                Self::Csrf(err) => tracing::error!(code = self.code(), error = ?err, "Request failed"),
                _ => tracing::error!(code = self.code(), error = %self, "Request failed"),
            }
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}
