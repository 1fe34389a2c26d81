// src/handlers/pokemon.rs
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::error::{ApiError, ErrorBody};
use crate::models::{
    Pokemon, PokemonList, PokemonListQuery, DEFAULT_POKEMON_LIMIT, MAX_POKEMON_LIMIT,
};
use crate::AppState;

fn invalid_query(message: impl Into<String>) -> ApiError {
    ApiError::BadRequest {
        code: "INVALID_QUERY",
        message: message.into(),
    }
}

#[utoipa::path(
    get,
    path = "/pokemon",
    tag = "Pokemon",
    params(PokemonListQuery),
    responses(
        (status = 200, description = "A page of Pokemon", body = PokemonList),
        (status = 400, description = "Invalid query", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody),
    ),
)]
pub async fn list_pokemon(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PokemonListQuery>, QueryRejection>,
) -> Result<Json<PokemonList>, ApiError> {
    let Query(query) = query.map_err(|e| invalid_query(e.body_text()))?;

    let limit = query.limit.unwrap_or(DEFAULT_POKEMON_LIMIT);
    if !(1..=MAX_POKEMON_LIMIT).contains(&limit) {
        return Err(invalid_query(format!(
            "limit must be between 1 and {}",
            MAX_POKEMON_LIMIT
        )));
    }
    let offset = query.offset.unwrap_or(0);

    let list = state.pokemon.list_pokemon(limit, offset).await?;
    Ok(Json(list))
}

#[utoipa::path(
    get,
    path = "/pokemon/{id}",
    tag = "Pokemon",
    params(("id" = String, Path, description = "Pokedex number or name")),
    responses(
        (status = 200, description = "The Pokemon", body = Pokemon),
        (status = 404, description = "Pokemon not found", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody),
    ),
)]
pub async fn get_pokemon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Pokemon>, ApiError> {
    let pokemon = state.pokemon.get_pokemon(&id).await?;
    Ok(Json(pokemon))
}
