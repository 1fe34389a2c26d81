// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_POKEMON_LIMIT: u32 = 20;
pub const MAX_POKEMON_LIMIT: u32 = 100;

// Tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(as = CreateTask)]
pub struct CreateTaskRequest {
    // Absent titles fail validation rather than parsing
    #[serde(default)]
    #[schema(required = true, min_length = 1, max_length = 100)]
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,
}

#[derive(Debug, Default, Deserialize, Validate, Serialize, ToSchema)]
#[schema(as = UpdateTask)]
pub struct UpdateTaskRequest {
    #[schema(min_length = 1, max_length = 100)]
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: Option<String>,
    pub completed: Option<bool>,
}

// CSRF
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CsrfTokenResponse {
    /// 64 lowercase hex characters, valid for one mutation.
    pub token: String,
}

// Pokemon (subset of the PokeAPI schema that is proxied through)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PokemonTypeName {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PokemonTypeSlot {
    #[serde(rename = "type")]
    pub kind: PokemonTypeName,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PokemonSprites {
    pub front_default: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Pokemon {
    pub id: u32,
    pub name: String,
    pub height: u32,
    pub weight: u32,
    pub types: Vec<PokemonTypeSlot>,
    pub sprites: PokemonSprites,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PokemonList {
    pub count: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<NamedResource>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PokemonListQuery {
    /// Page size, 20 when omitted.
    #[param(minimum = 1, maximum = 100)]
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub environment: String,
}
