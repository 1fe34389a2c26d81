// src/handlers/docs.rs - OpenAPI document and reference page
use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{Html, IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::csrf::CSRF_TOKEN_HEADER;
use crate::error::{ErrorBody, FieldError};
use crate::handlers::{csrf, pokemon, tasks};
use crate::models::{
    CreateTaskRequest, CsrfTokenResponse, NamedResource, Pokemon, PokemonList, PokemonSprites,
    PokemonTypeName, PokemonTypeSlot, Task, UpdateTaskRequest,
};
use crate::AppState;

const DOCS_CSP: &str = "default-src 'self'; script-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net; \
     style-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net; font-src 'self' data: https://cdn.jsdelivr.net; \
     img-src 'self' data: https:; connect-src 'self'";

const DOCS_PAGE: &str = r#"<!doctype html>
<html>
  <head>
    <title>Tasks API Reference</title>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
  </head>
  <body>
    <script id="api-reference" data-url="/openapi.json"></script>
    <script src="https://cdn.jsdelivr.net/npm/@scalar/api-reference"></script>
  </body>
</html>
"#;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "csrf",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    String::from("X-CSRF-Token"),
                    format!(
                        "CSRF token required for mutation operations. Obtain one from GET /csrf \
                         under the API prefix and send it in the {} header; each token works once.",
                        CSRF_TOKEN_HEADER
                    ),
                ))),
            );
        }

        // Reads never need a token; an empty list overrides the global requirement
        for item in openapi.paths.paths.values_mut() {
            if let Some(get) = item.get.as_mut() {
                get.security.get_or_insert_with(Vec::new);
            }
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Tasks API", description = "A REST API with CSRF protection"),
    paths(
        csrf::issue_token,
        tasks::list_tasks,
        tasks::get_task,
        tasks::create_task,
        tasks::update_task,
        tasks::delete_task,
        pokemon::list_pokemon,
        pokemon::get_pokemon,
    ),
    components(schemas(
        Task,
        CreateTaskRequest,
        UpdateTaskRequest,
        CsrfTokenResponse,
        NamedResource,
        PokemonTypeName,
        PokemonTypeSlot,
        PokemonSprites,
        Pokemon,
        PokemonList,
        ErrorBody,
        FieldError,
    )),
    security(("csrf" = [])),
    modifiers(&SecurityAddon),
    tags(
        (name = "CSRF", description = "One-time tokens for state-changing requests"),
        (name = "Tasks", description = "Task management"),
        (name = "Pokemon", description = "Cached PokeAPI proxy"),
    ),
)]
struct ApiDoc;

/// Build the OpenAPI 3.1 description of the API mounted under `api_prefix`.
pub fn openapi_document(api_prefix: &str) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.paths.paths = std::mem::take(&mut doc.paths.paths)
        .into_iter()
        .map(|(path, item)| (format!("{}{}", api_prefix, path), item))
        .collect();
    doc
}

pub async fn openapi_json(State(state): State<Arc<AppState>>) -> Json<utoipa::openapi::OpenApi> {
    Json(openapi_document(&state.config.api_prefix()))
}

pub async fn docs_page() -> Response {
    let mut response = Html(DOCS_PAGE).into_response();
    // The reference UI is loaded from a CDN
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(DOCS_CSP),
    );
    response
}
