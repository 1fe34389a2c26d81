// src/csrf/mod.rs - CSRF token lifecycle
//! Issuance, storage, one-time consumption and expiry of CSRF tokens.
//!
//! Tokens are bound to the client address that requested them, limited to a
//! fixed number of outstanding tokens per address, and deleted the moment a
//! mutating request presents them.

pub mod clock;
pub mod issuer;
pub mod store;
pub mod validator;

use axum::http::StatusCode;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use clock::{Clock, SystemClock};
pub use issuer::TokenIssuer;
pub use store::{SqliteTokenStore, StoreError, TokenRecord, TokenStore};
pub use validator::TokenValidator;

/// Header carrying the token on mutating requests.
pub const CSRF_TOKEN_HEADER: &str = "x-csrf-token";

pub const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_TOKENS_PER_ADDRESS: u64 = 10;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Whether a token must be presented from the address it was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressBinding {
    Enforce,
    /// Accept tokens from any address. Only meant for local development,
    /// where proxies and loopback make address attribution unreliable.
    Relaxed,
}

impl FromStr for AddressBinding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" | "strict" => Ok(Self::Enforce),
            "relaxed" | "off" => Ok(Self::Relaxed),
            other => Err(format!("expected 'enforce' or 'relaxed', got '{}'", other)),
        }
    }
}

#[derive(Clone)]
pub struct CsrfSettings {
    pub secret: String,
    pub token_expiry: Duration,
    pub max_tokens_per_address: u64,
    pub sweep_interval: Duration,
    pub address_binding: AddressBinding,
}

// Never print the secret
impl fmt::Debug for CsrfSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfSettings")
            .field("secret", &"<redacted>")
            .field("token_expiry", &self.token_expiry)
            .field("max_tokens_per_address", &self.max_tokens_per_address)
            .field("sweep_interval", &self.sweep_interval)
            .field("address_binding", &self.address_binding)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CsrfError {
    #[error("CSRF token is required")]
    MissingToken,

    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Token not found or already used")]
    NotFoundOrUsed,

    #[error("Token not valid for this client address")]
    AddressMismatch,

    #[error("Token has expired")]
    Expired,

    #[error("Token has already been used")]
    AlreadyConsumed,

    #[error("Failed to invalidate token")]
    ConsumptionFailure(#[source] StoreError),

    #[error("Invalid CSRF token")]
    ValidationFailure(#[source] StoreError),

    #[error("Too many active tokens for this client")]
    QuotaExceeded,

    #[error("Failed to generate token")]
    StorageFailure(#[source] StoreError),

    #[error("Failed to generate token")]
    TokenGenerationFailed,
}

impl CsrfError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ConsumptionFailure(_) | Self::StorageFailure(_) | Self::TokenGenerationFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "CSRF_TOKEN_MISSING",
            Self::InvalidFormat => "CSRF_TOKEN_INVALID_FORMAT",
            Self::NotFoundOrUsed => "CSRF_TOKEN_NOT_FOUND",
            Self::AddressMismatch => "CSRF_TOKEN_ADDRESS_MISMATCH",
            Self::Expired => "CSRF_TOKEN_EXPIRED",
            Self::AlreadyConsumed => "CSRF_TOKEN_ALREADY_CONSUMED",
            Self::ConsumptionFailure(_) => "CSRF_TOKEN_CONSUMPTION_FAILED",
            Self::ValidationFailure(_) => "CSRF_TOKEN_INVALID",
            Self::QuotaExceeded => "CSRF_TOKEN_QUOTA_EXCEEDED",
            Self::StorageFailure(_) => "CSRF_TOKEN_STORAGE_FAILED",
            Self::TokenGenerationFailed => "CSRF_TOKEN_GENERATION_FAILED",
        }
    }
}

/// First characters of a token, safe to put in logs.
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or("")
}

/// Issuer and validator sharing one store, as held in the app state.
pub struct CsrfProtection {
    store: Arc<dyn TokenStore>,
    issuer: TokenIssuer,
    validator: TokenValidator,
}

impl CsrfProtection {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, settings: &CsrfSettings) -> Self {
        Self {
            issuer: TokenIssuer::new(store.clone(), clock.clone(), settings),
            validator: TokenValidator::new(store.clone(), clock, settings),
            store,
        }
    }

    pub async fn issue(&self, client_address: &str) -> Result<String, CsrfError> {
        self.issuer.issue(client_address).await
    }

    pub async fn validate(&self, token: &str, client_address: &str) -> Result<(), CsrfError> {
        self.validator.validate(token, client_address).await
    }

    pub fn store(&self) -> Arc<dyn TokenStore> {
        self.store.clone()
    }
}
