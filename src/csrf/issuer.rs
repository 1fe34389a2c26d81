// src/csrf/issuer.rs - Token issuance
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::clock::{duration_millis, Clock};
use super::store::{StoreError, TokenRecord, TokenStore};
use super::{CsrfError, CsrfSettings};
use crate::utils::hash::derive_csrf_token;

pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    secret: String,
    token_expiry_millis: i64,
    max_tokens_per_address: u64,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, settings: &CsrfSettings) -> Self {
        Self {
            store,
            clock,
            secret: settings.secret.clone(),
            token_expiry_millis: duration_millis(settings.token_expiry),
            max_tokens_per_address: settings.max_tokens_per_address,
        }
    }

    /// Mint and persist a new token for `client_address`.
    ///
    /// Only unexpired tokens count against the per-address quota. The store
    /// checks the quota and inserts in one step, so concurrent requests from
    /// one address cannot overshoot it and different addresses never wait on
    /// each other.
    pub async fn issue(&self, client_address: &str) -> Result<String, CsrfError> {
        let now = self.clock.now_millis();
        let live_since = now - self.token_expiry_millis;

        // Two issuances for one address in the same millisecond derive the same
        // token. Each retry moves `issued_at` forward by one millisecond; the
        // address has fewer than `max_tokens_per_address` live records, so that
        // many attempts always find a free slot.
        let attempts = i64::try_from(self.max_tokens_per_address).unwrap_or(i64::MAX).max(1);

        for attempt in 0..attempts {
            let issued_at = now + attempt;
            let record = TokenRecord {
                token: derive_csrf_token(issued_at, &self.secret, client_address),
                issuer_address: client_address.to_string(),
                issued_at,
            };

            match self
                .store
                .insert_within_quota(&record, self.max_tokens_per_address, live_since)
                .await
            {
                Ok(true) => {
                    debug!(client_address, attempt, "Token generated and stored");
                    return Ok(record.token);
                }
                Ok(false) => {
                    warn!(
                        client_address,
                        limit = self.max_tokens_per_address,
                        "Too many active tokens for client"
                    );
                    return Err(CsrfError::QuotaExceeded);
                }
                Err(StoreError::DuplicateKey) => {
                    debug!(client_address, attempt, "Derived token already exists, re-deriving");
                }
                Err(err) => {
                    error!(error = %err, client_address, "Failed to store token");
                    return Err(CsrfError::StorageFailure(err));
                }
            }
        }

        error!(client_address, "Could not derive a unique token");
        Err(CsrfError::TokenGenerationFailed)
    }
}
