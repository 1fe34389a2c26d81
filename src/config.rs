// src/config.rs
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::csrf::{
    AddressBinding, CsrfSettings, DEFAULT_MAX_TOKENS_PER_ADDRESS, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_TOKEN_EXPIRY,
};
use crate::utils::hash::generate_secret;

pub const MIN_SECRET_LENGTH: usize = 32;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5500";
pub const DEFAULT_POKE_API_BASE: &str = "https://pokeapi.co/api/v2";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("CSRF_SECRET must be at least {} characters long", MIN_SECRET_LENGTH)]
    SecretTooShort,

    #[error("invalid server address {0}")]
    Address(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(format!(
                "expected development, production or test, got '{}'",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_level: String,
    pub api_version: String,
    pub database_url: String,
    pub csrf: CsrfSettings,
    /// True when no CSRF_SECRET was configured and one was generated at startup.
    pub ephemeral_secret: bool,
    pub allowed_origins: Vec<String>,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub poke_api_base: String,
    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`. Off by
    /// default: only enable behind a proxy that overwrites those headers,
    /// otherwise clients can pick their own address and dodge per-address limits.
    pub trust_proxy_headers: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = parse_or(&lookup, "APP_ENV", Environment::Development)?;

        let (secret, ephemeral_secret) = match lookup("CSRF_SECRET") {
            Some(secret) if secret.len() >= MIN_SECRET_LENGTH => (secret, false),
            Some(_) => return Err(ConfigError::SecretTooShort),
            None => (generate_secret(), true),
        };

        // Strict outside production would break local setups behind loopback proxies
        let default_binding = if environment.is_production() {
            AddressBinding::Enforce
        } else {
            AddressBinding::Relaxed
        };

        let csrf = CsrfSettings {
            secret,
            token_expiry: Duration::from_secs(positive(
                "CSRF_TOKEN_EXPIRY_SECS",
                parse_or(&lookup, "CSRF_TOKEN_EXPIRY_SECS", DEFAULT_TOKEN_EXPIRY.as_secs())?,
            )?),
            max_tokens_per_address: positive(
                "CSRF_MAX_TOKENS_PER_ADDRESS",
                parse_or(
                    &lookup,
                    "CSRF_MAX_TOKENS_PER_ADDRESS",
                    DEFAULT_MAX_TOKENS_PER_ADDRESS,
                )?,
            )?,
            sweep_interval: Duration::from_secs(positive(
                "CSRF_SWEEP_INTERVAL_SECS",
                parse_or(
                    &lookup,
                    "CSRF_SWEEP_INTERVAL_SECS",
                    DEFAULT_SWEEP_INTERVAL.as_secs(),
                )?,
            )?),
            address_binding: parse_or(&lookup, "CSRF_ADDRESS_BINDING", default_binding)?,
        };

        let allowed_origins = parse_origins(
            &lookup("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string()),
        )?;

        let rate_limit_window_ms: u64 = positive(
            "RATE_LIMIT_WINDOW_MS",
            parse_or(&lookup, "RATE_LIMIT_WINDOW_MS", 60_000)?,
        )?;

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            environment,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            api_version: lookup("API_VERSION").unwrap_or_else(|| "v1".to_string()),
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://csrf_tokens.db?mode=rwc".to_string()),
            csrf,
            ephemeral_secret,
            allowed_origins,
            rate_limit_max: positive(
                "RATE_LIMIT_MAX",
                parse_or(&lookup, "RATE_LIMIT_MAX", 100)?,
            )?,
            rate_limit_window: Duration::from_millis(rate_limit_window_ms),
            poke_api_base: lookup("POKE_API_BASE")
                .unwrap_or_else(|| DEFAULT_POKE_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            trust_proxy_headers: parse_or(&lookup, "TRUST_PROXY_HEADERS", false)?,
        })
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::Address(addr))
    }

    /// Path prefix the versioned API is mounted under, e.g. `/api/v1`.
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn positive<T>(name: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        })
    }
}

fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut origins = Vec::new();
    for origin in raw.split(',').map(str::trim) {
        if origin.is_empty() {
            return Err(ConfigError::Invalid {
                name: "ALLOWED_ORIGINS",
                reason: "contains empty value".to_string(),
            });
        }
        if let Err(e) = url::Url::parse(origin) {
            return Err(ConfigError::Invalid {
                name: "ALLOWED_ORIGINS",
                reason: format!("'{}' is not a valid origin: {}", origin, e),
            });
        }
        if !origins.iter().any(|o| o == origin) {
            origins.push(origin.to_string());
        }
    }
    Ok(origins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.api_prefix(), "/api/v1");
        assert_eq!(config.csrf.token_expiry, Duration::from_secs(86_400));
        assert_eq!(config.csrf.max_tokens_per_address, 10);
        assert_eq!(config.csrf.sweep_interval, Duration::from_secs(3_600));
        assert_eq!(config.csrf.address_binding, AddressBinding::Relaxed);
        assert_eq!(config.allowed_origins, vec![DEFAULT_ALLOWED_ORIGIN.to_string()]);
        assert_eq!(config.rate_limit_max, 100);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert!(!config.trust_proxy_headers);
        assert!(config.ephemeral_secret);
        assert!(config.csrf.secret.len() >= MIN_SECRET_LENGTH);
    }

    #[test]
    fn test_proxy_headers_are_opt_in() {
        let config = load(&[("TRUST_PROXY_HEADERS", "true")]).unwrap();
        assert!(config.trust_proxy_headers);
    }

    #[test]
    fn test_production_enforces_binding_by_default() {
        let config = load(&[("APP_ENV", "production")]).unwrap();
        assert_eq!(config.csrf.address_binding, AddressBinding::Enforce);

        let relaxed = load(&[("APP_ENV", "production"), ("CSRF_ADDRESS_BINDING", "relaxed")])
            .unwrap();
        assert_eq!(relaxed.csrf.address_binding, AddressBinding::Relaxed);
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let err = load(&[("CSRF_SECRET", "too-short")]).unwrap_err();
        assert!(matches!(err, ConfigError::SecretTooShort));
    }

    #[test]
    fn test_configured_secret_is_used() {
        let secret = "x".repeat(40);
        let config = load(&[("CSRF_SECRET", secret.as_str())]).unwrap();
        assert_eq!(config.csrf.secret, secret);
        assert!(!config.ephemeral_secret);
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("PORT", "not-a-port")]).is_err());
        assert!(load(&[("APP_ENV", "staging")]).is_err());
        assert!(load(&[("CSRF_SWEEP_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("RATE_LIMIT_WINDOW_MS", "0")]).is_err());
        assert!(load(&[("ALLOWED_ORIGINS", "http://a.example,,http://b.example")]).is_err());
    }

    #[test]
    fn test_origins_are_trimmed_and_deduplicated() {
        let config = load(&[(
            "ALLOWED_ORIGINS",
            "https://app.example.com , https://app.example.com,http://localhost:5500",
        )])
        .unwrap();

        assert_eq!(
            config.allowed_origins,
            vec!["https://app.example.com", "http://localhost:5500"]
        );
    }

    #[test]
    fn test_server_addr() {
        let config = load(&[("HOST", "127.0.0.1"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.server_addr().unwrap().port(), 8080);
    }
}
