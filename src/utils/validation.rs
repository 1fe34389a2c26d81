// src/utils/validation.rs
use regex::Regex;

const MAX_POKEMON_IDENTIFIER_LENGTH: usize = 64;

lazy_static::lazy_static! {
    static ref CSRF_TOKEN_REGEX: Regex = Regex::new(r"^[a-f0-9]{64}$").unwrap();
    static ref POKEMON_IDENTIFIER_REGEX: Regex = Regex::new(r"^[a-z0-9-]+$").unwrap();
}

/// Validates CSRF token format: 64 lowercase hex characters
pub fn is_valid_csrf_token(token: &str) -> bool {
    token.len() == 64 && CSRF_TOKEN_REGEX.is_match(token)
}

/// Normalizes a Pokemon id or name for the upstream API.
///
/// Returns `None` for anything that is not a plain id or slug, so callers can
/// never build an upstream path from arbitrary input.
pub fn normalize_pokemon_identifier(identifier: &str) -> Option<String> {
    let normalized = identifier.trim().to_lowercase();

    if normalized.is_empty() || normalized.len() > MAX_POKEMON_IDENTIFIER_LENGTH {
        return None;
    }

    if !POKEMON_IDENTIFIER_REGEX.is_match(&normalized) {
        return None;
    }

    Some(normalized)
}
