// src/test_support.rs - Shared fixtures for router and handler tests
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::csrf::clock::ManualClock;
use crate::db::Database;
use crate::AppState;

pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac-0123";

/// Test configuration; `overrides` replace or add variables.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("APP_ENV", "test"),
        ("CSRF_SECRET", TEST_SECRET),
        ("DATABASE_URL", "sqlite::memory:"),
        // Router tests pick client addresses through X-Forwarded-For
        ("TRUST_PROXY_HEADERS", "true"),
        // Nothing listens here, upstream calls fail fast
        ("POKE_API_BASE", "http://127.0.0.1:9"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }

    Config::from_lookup(|name| vars.get(name).cloned()).expect("test config is valid")
}

/// App state over a fresh in-memory database and a clock the test controls.
pub async fn test_state(config: Config) -> (Arc<AppState>, Arc<ManualClock>) {
    let db = Database::new(&config.database_url)
        .await
        .expect("in-memory database");
    db.migrate().await.expect("migrations apply");

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let state = AppState::build(config, db, clock.clone()).expect("app state");

    (Arc::new(state), clock)
}
