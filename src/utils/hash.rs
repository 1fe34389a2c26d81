// src/utils/hash.rs
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Derives a CSRF token as `hex(SHA-256(issued_at ‖ secret ‖ client_address))`.
///
/// The token is reproducible from its inputs but cannot be forged without the
/// server secret.
pub fn derive_csrf_token(issued_at: i64, secret: &str, client_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(issued_at.to_string().as_bytes());
    hasher.update(secret.as_bytes());
    hasher.update(client_address.as_bytes());
    hex::encode(hasher.finalize())
}

/// 32 random bytes, hex encoded. Used when no secret is configured.
pub fn generate_secret() -> String {
    let mut random_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut random_bytes);
    hex::encode(random_bytes)
}
