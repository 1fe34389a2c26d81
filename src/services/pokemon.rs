// src/services/pokemon.rs - Read-only proxy to PokeAPI
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::middleware::cache::CacheService;
use crate::models::{Pokemon, PokemonList};
use crate::utils::validation::normalize_pokemon_identifier;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

const POKEMON_NOT_FOUND: ApiError = ApiError::NotFound {
    code: "POKEMON_NOT_FOUND",
    message: "Pokemon not found",
};
const POKEMON_FETCH_ERROR: ApiError = ApiError::Upstream {
    code: "POKEMON_FETCH_ERROR",
    message: "Failed to fetch Pokemon data",
};
const POKEMON_LIST_ERROR: ApiError = ApiError::Upstream {
    code: "POKEMON_LIST_ERROR",
    message: "Failed to fetch Pokemon list",
};

#[derive(Clone)]
pub struct PokeApiClient {
    http: reqwest::Client,
    base_url: String,
    cache: CacheService,
}

impl PokeApiClient {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: CacheService::new(),
        })
    }

    /// Look up a Pokemon by numeric id or name.
    pub async fn get_pokemon(&self, identifier: &str) -> Result<Pokemon, ApiError> {
        let Some(key) = normalize_pokemon_identifier(identifier) else {
            return Err(POKEMON_NOT_FOUND);
        };

        if let Some(pokemon) = self.cache.get_pokemon(&key).await {
            debug!(pokemon = %key, "Pokemon served from cache");
            return Ok(pokemon);
        }

        let url = format!("{}/pokemon/{}", self.base_url, key);
        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!(error = %e, %url, "Pokemon request failed");
            POKEMON_FETCH_ERROR
        })?;

        if !response.status().is_success() {
            debug!(status = %response.status(), %url, "Upstream has no such Pokemon");
            return Err(POKEMON_NOT_FOUND);
        }

        let pokemon: Pokemon = response.json().await.map_err(|e| {
            warn!(error = %e, %url, "Unexpected Pokemon payload");
            POKEMON_FETCH_ERROR
        })?;

        self.cache.set_pokemon(key, pokemon.clone()).await;
        Ok(pokemon)
    }

    pub async fn list_pokemon(&self, limit: u32, offset: u32) -> Result<PokemonList, ApiError> {
        if let Some(list) = self.cache.get_list(limit, offset).await {
            debug!(limit, offset, "Pokemon list served from cache");
            return Ok(list);
        }

        let url = format!("{}/pokemon", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(error = %e, %url, "Pokemon list request failed");
                POKEMON_LIST_ERROR
            })?;

        let list: PokemonList = response.json().await.map_err(|e| {
            warn!(error = %e, %url, "Unexpected Pokemon list payload");
            POKEMON_LIST_ERROR
        })?;

        self.cache.set_list(limit, offset, list.clone()).await;
        Ok(list)
    }
}
