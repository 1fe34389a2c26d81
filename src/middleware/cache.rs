// src/middleware/cache.rs
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Pokemon, PokemonList};

/// Short-lived cache in front of the upstream Pokemon API.
#[derive(Clone)]
pub struct CacheService {
    pokemon_cache: Arc<Cache<String, Pokemon>>,
    list_cache: Arc<Cache<(u32, u32), PokemonList>>,
}

impl CacheService {
    pub fn new() -> Self {
        Self {
            pokemon_cache: Arc::new(
                Cache::builder()
                    .max_capacity(1000)
                    .time_to_live(Duration::from_secs(300)) // 5 minutes
                    .build(),
            ),
            list_cache: Arc::new(
                Cache::builder()
                    .max_capacity(100)
                    .time_to_live(Duration::from_secs(60)) // 1 minute
                    .build(),
            ),
        }
    }

    pub async fn get_pokemon(&self, key: &str) -> Option<Pokemon> {
        self.pokemon_cache.get(key).await
    }

    pub async fn set_pokemon(&self, key: String, value: Pokemon) {
        self.pokemon_cache.insert(key, value).await;
    }

    pub async fn get_list(&self, limit: u32, offset: u32) -> Option<PokemonList> {
        self.list_cache.get(&(limit, offset)).await
    }

    pub async fn set_list(&self, limit: u32, offset: u32, value: PokemonList) {
        self.list_cache.insert((limit, offset), value).await;
    }
}
