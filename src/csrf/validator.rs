// src/csrf/validator.rs - Token validation and one-time consumption
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::clock::{duration_millis, Clock};
use super::store::TokenStore;
use super::{token_prefix, AddressBinding, CsrfError, CsrfSettings};
use crate::utils::validation::is_valid_csrf_token;

pub struct TokenValidator {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    token_expiry_millis: i64,
    address_binding: AddressBinding,
}

impl TokenValidator {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, settings: &CsrfSettings) -> Self {
        Self {
            store,
            clock,
            token_expiry_millis: duration_millis(settings.token_expiry),
            address_binding: settings.address_binding,
        }
    }

    /// Check `token` and consume it.
    ///
    /// On `Ok` the token has already been deleted from the store, so the
    /// protected operation may run and the token can never be replayed, even
    /// if that operation fails. When two requests race on one token, exactly
    /// one deletion removes the row and only that request gets `Ok`.
    pub async fn validate(&self, token: &str, client_address: &str) -> Result<(), CsrfError> {
        if !is_valid_csrf_token(token) {
            return Err(CsrfError::InvalidFormat);
        }

        let record = self
            .store
            .get(token)
            .await
            .map_err(CsrfError::ValidationFailure)?
            .ok_or(CsrfError::NotFoundOrUsed)?;

        match self.address_binding {
            AddressBinding::Enforce => {
                let same_address: bool = record
                    .issuer_address
                    .as_bytes()
                    .ct_eq(client_address.as_bytes())
                    .into();
                if !same_address {
                    return Err(CsrfError::AddressMismatch);
                }
            }
            AddressBinding::Relaxed => {
                if record.issuer_address != client_address {
                    debug!(
                        issuer_address = %record.issuer_address,
                        client_address,
                        "Address binding relaxed, accepting token from another address"
                    );
                }
            }
        }

        let age = self.clock.now_millis() - record.issued_at;
        if age > self.token_expiry_millis {
            if let Err(err) = self.store.delete_by_token(token).await {
                warn!(error = %err, token = token_prefix(token), "Failed to delete expired token");
            }
            return Err(CsrfError::Expired);
        }

        match self.store.delete_by_token(token).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CsrfError::AlreadyConsumed),
            Err(err) => Err(CsrfError::ConsumptionFailure(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::clock::ManualClock;
    use crate::csrf::issuer::TokenIssuer;
    use crate::csrf::store::{MemoryTokenStore, SqliteTokenStore, StoreError, TokenRecord};
    use crate::db::Database;
    use crate::csrf::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TOKEN_EXPIRY};
    use async_trait::async_trait;
    use std::time::Duration;

    const START: i64 = 1_700_000_000_000;

    fn settings(address_binding: AddressBinding) -> CsrfSettings {
        CsrfSettings {
            secret: "validator-test-secret-with-plenty-of-entropy".into(),
            token_expiry: DEFAULT_TOKEN_EXPIRY,
            max_tokens_per_address: 10,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            address_binding,
        }
    }

    struct Harness {
        store: MemoryTokenStore,
        clock: Arc<ManualClock>,
        issuer: TokenIssuer,
        validator: Arc<TokenValidator>,
    }

    fn harness(address_binding: AddressBinding) -> Harness {
        let store = MemoryTokenStore::new();
        let clock = Arc::new(ManualClock::new(START));
        let settings = settings(address_binding);
        Harness {
            issuer: TokenIssuer::new(Arc::new(store.clone()), clock.clone(), &settings),
            validator: Arc::new(TokenValidator::new(
                Arc::new(store.clone()),
                clock.clone(),
                &settings,
            )),
            store,
            clock,
        }
    }

    #[tokio::test]
    async fn test_valid_token_is_consumed() {
        let h = harness(AddressBinding::Enforce);
        let token = h.issuer.issue("10.0.0.1").await.unwrap();

        h.validator.validate(&token, "10.0.0.1").await.unwrap();

        assert!(h.store.get(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_is_rejected() {
        let h = harness(AddressBinding::Enforce);
        let token = h.issuer.issue("10.0.0.1").await.unwrap();

        h.validator.validate(&token, "10.0.0.1").await.unwrap();
        let err = h.validator.validate(&token, "10.0.0.1").await.unwrap_err();

        assert!(matches!(err, CsrfError::NotFoundOrUsed | CsrfError::AlreadyConsumed));
    }

    #[tokio::test]
    async fn test_malformed_token_is_rejected() {
        let h = harness(AddressBinding::Enforce);

        let uppercase = "A".repeat(64);
        let not_hex = "z".repeat(64);
        for bad in ["", "abc", uppercase.as_str(), not_hex.as_str()] {
            let err = h.validator.validate(bad, "10.0.0.1").await.unwrap_err();
            assert!(matches!(err, CsrfError::InvalidFormat), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let h = harness(AddressBinding::Enforce);

        let err = h.validator.validate(&"0".repeat(64), "10.0.0.1").await.unwrap_err();

        assert!(matches!(err, CsrfError::NotFoundOrUsed));
    }

    #[tokio::test]
    async fn test_address_mismatch_keeps_token() {
        let h = harness(AddressBinding::Enforce);
        let token = h.issuer.issue("10.0.0.1").await.unwrap();

        let err = h.validator.validate(&token, "10.0.0.2").await.unwrap_err();
        assert!(matches!(err, CsrfError::AddressMismatch));

        // The rightful owner can still use it
        h.validator.validate(&token, "10.0.0.1").await.unwrap();
    }

    #[tokio::test]
    async fn test_relaxed_binding_accepts_other_address() {
        let h = harness(AddressBinding::Relaxed);
        let token = h.issuer.issue("10.0.0.1").await.unwrap();

        h.validator.validate(&token, "127.0.0.1").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected_and_removed() {
        let h = harness(AddressBinding::Enforce);
        let token = h.issuer.issue("10.0.0.1").await.unwrap();

        h.clock.advance(DEFAULT_TOKEN_EXPIRY + Duration::from_millis(1));
        let err = h.validator.validate(&token, "10.0.0.1").await.unwrap_err();

        assert!(matches!(err, CsrfError::Expired));
        assert!(h.store.get(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_valid_at_exact_expiry() {
        let h = harness(AddressBinding::Enforce);
        let token = h.issuer.issue("10.0.0.1").await.unwrap();

        h.clock.advance(DEFAULT_TOKEN_EXPIRY);

        h.validator.validate(&token, "10.0.0.1").await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_validation_has_one_winner() {
        let h = harness(AddressBinding::Enforce);
        let token = h.issuer.issue("10.0.0.1").await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let validator = h.validator.clone();
                let token = token.clone();
                tokio::spawn(async move { validator.validate(&token, "10.0.0.1").await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(CsrfError::NotFoundOrUsed | CsrfError::AlreadyConsumed) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_concurrent_validation_on_shared_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("tokens.db").display());
        let db = Database::new(&url).await.unwrap();
        db.migrate().await.unwrap();

        // A file database gets a multi-connection pool, so the deletes below
        // really do run on separate connections.
        let store: Arc<dyn TokenStore> = Arc::new(SqliteTokenStore::new(db.pool().clone()));
        let clock = Arc::new(ManualClock::new(START));
        let settings = settings(AddressBinding::Enforce);
        let issuer = TokenIssuer::new(store.clone(), clock.clone(), &settings);
        let validator = Arc::new(TokenValidator::new(store, clock, &settings));

        for _ in 0..5 {
            let token = issuer.issue("10.0.0.1").await.unwrap();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let validator = validator.clone();
                    let token = token.clone();
                    tokio::spawn(async move { validator.validate(&token, "10.0.0.1").await })
                })
                .collect();

            let mut winners = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(()) => winners += 1,
                    Err(CsrfError::NotFoundOrUsed | CsrfError::AlreadyConsumed) => {}
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            assert_eq!(winners, 1);
        }
    }

    /// Store whose row disappears between lookup and deletion, as when a
    /// concurrent request consumes the token first.
    struct RacingStore {
        record: TokenRecord,
    }

    #[async_trait]
    impl TokenStore for RacingStore {
        async fn insert(&self, _: &TokenRecord) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get(&self, _: &str) -> Result<Option<TokenRecord>, StoreError> {
            Ok(Some(self.record.clone()))
        }
        async fn delete_by_token(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn count_by_address(&self, _: &str) -> Result<u64, StoreError> {
            Ok(1)
        }
        async fn insert_within_quota(&self, _: &TokenRecord, _: u64, _: i64) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn delete_older_than(&self, _: i64) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_already_consumed() {
        let token = "f".repeat(64);
        let store = RacingStore {
            record: TokenRecord {
                token: token.clone(),
                issuer_address: "10.0.0.1".into(),
                issued_at: START,
            },
        };
        let validator = TokenValidator::new(
            Arc::new(store),
            Arc::new(ManualClock::new(START)),
            &settings(AddressBinding::Enforce),
        );

        let err = validator.validate(&token, "10.0.0.1").await.unwrap_err();

        assert!(matches!(err, CsrfError::AlreadyConsumed));
    }

    struct BrokenDeleteStore {
        record: TokenRecord,
    }

    #[async_trait]
    impl TokenStore for BrokenDeleteStore {
        async fn insert(&self, _: &TokenRecord) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get(&self, _: &str) -> Result<Option<TokenRecord>, StoreError> {
            Ok(Some(self.record.clone()))
        }
        async fn delete_by_token(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend("database is locked".into()))
        }
        async fn count_by_address(&self, _: &str) -> Result<u64, StoreError> {
            Ok(1)
        }
        async fn insert_within_quota(&self, _: &TokenRecord, _: u64, _: i64) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn delete_older_than(&self, _: i64) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_consumption_failure() {
        let token = "e".repeat(64);
        let store = BrokenDeleteStore {
            record: TokenRecord {
                token: token.clone(),
                issuer_address: "10.0.0.1".into(),
                issued_at: START,
            },
        };
        let validator = TokenValidator::new(
            Arc::new(store),
            Arc::new(ManualClock::new(START)),
            &settings(AddressBinding::Enforce),
        );

        let err = validator.validate(&token, "10.0.0.1").await.unwrap_err();

        assert!(matches!(err, CsrfError::ConsumptionFailure(_)));
    }
}
