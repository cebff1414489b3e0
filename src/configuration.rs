use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;
const GENERATED_SECRET_LENGTH: usize = 64;
const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub jwt: JwtSettings,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Production,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    /// Upper bound for every store / directory call
    #[serde(default = "default_timeout_milliseconds")]
    pub timeout_milliseconds: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

/// Raw JWT settings as read from file and environment.
///
/// Secrets are optional here; `resolve` decides whether a missing secret is
/// fatal.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: Option<String>,
    pub refresh_secret: Option<String>,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_hash_cost")]
    pub hash_cost: u32,
}

/// Validated token configuration, created once at start-up
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub algorithm: Algorithm,
    pub issuer: String,
    pub hash_cost: u32,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            access_secret: None,
            refresh_secret: None,
            access_token_expiry: default_access_token_expiry(),
            refresh_token_expiry: default_refresh_token_expiry(),
            algorithm: default_algorithm(),
            issuer: default_issuer(),
            hash_cost: default_hash_cost(),
        }
    }
}

impl JwtSettings {
    pub fn resolve(&self, environment: Environment) -> Result<TokenSettings, ConfigError> {
        let access_secret = resolve_secret("jwt.access_secret", &self.access_secret, environment)?;
        let refresh_secret =
            resolve_secret("jwt.refresh_secret", &self.refresh_secret, environment)?;

        if access_secret == refresh_secret {
            return Err(ConfigError::InvalidValue(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }

        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiry must be a positive number of seconds".to_string(),
            ));
        }

        let algorithm = Algorithm::from_str(&self.algorithm)
            .map_err(|_| ConfigError::InvalidValue(format!("jwt.algorithm: {}", self.algorithm)))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.algorithm must be an HMAC algorithm, got {}",
                self.algorithm
            )));
        }

        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.hash_cost) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.hash_cost must be between {} and {}",
                MIN_HASH_COST, MAX_HASH_COST
            )));
        }

        Ok(TokenSettings {
            access_secret,
            refresh_secret,
            access_token_expiry: self.access_token_expiry,
            refresh_token_expiry: self.refresh_token_expiry,
            algorithm,
            issuer: self.issuer.clone(),
            hash_cost: self.hash_cost,
        })
    }
}

fn resolve_secret(
    key: &str,
    value: &Option<String>,
    environment: Environment,
) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(secret) if !secret.is_empty() => {
            if secret.len() < MIN_SECRET_LENGTH {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be at least {} bytes",
                    key, MIN_SECRET_LENGTH
                )));
            }
            Ok(secret.to_string())
        }
        _ if environment == Environment::Production => {
            Err(ConfigError::MissingRequired(key.to_string()))
        }
        _ => {
            tracing::warn!(
                key = key,
                "No secret configured, generated an ephemeral one; tokens will not survive a restart"
            );
            Ok(thread_rng()
                .sample_iter(&Alphanumeric)
                .take(GENERATED_SECRET_LENGTH)
                .map(char::from)
                .collect())
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_timeout_milliseconds() -> u64 {
    5000
}

fn default_access_token_expiry() -> i64 {
    3600
}

fn default_refresh_token_expiry() -> i64 {
    604800
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_issuer() -> String {
    "session-auth".to_string()
}

fn default_hash_cost() -> u32 {
    10
}

/// Load settings from `configuration.*`, then `APP_*` variables
/// (`APP_JWT__ACCESS_SECRET`), then the legacy `JWT_*` variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("jwt.access_secret", std::env::var("JWT_SECRET").ok())?
        .set_override_option("jwt.refresh_secret", std::env::var("JWT_REFRESH_SECRET").ok())?
        .set_override_option(
            "jwt.access_token_expiry",
            std::env::var("JWT_ACCESS_EXPIRATION").ok(),
        )?
        .set_override_option(
            "jwt.refresh_token_expiry",
            std::env::var("JWT_REFRESH_EXPIRATION").ok(),
        )?
        .build()?;
    Ok(settings.try_deserialize::<Settings>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_settings() -> JwtSettings {
        JwtSettings {
            access_secret: Some("access-secret-key-at-least-32-characters".to_string()),
            refresh_secret: Some("refresh-secret-key-at-least-32-characters".to_string()),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            algorithm: "HS256".to_string(),
            issuer: "test".to_string(),
            hash_cost: 10,
        }
    }

    #[test]
    fn test_resolve_valid_settings() {
        let settings = raw_settings().resolve(Environment::Production).unwrap();
        assert_eq!(settings.algorithm, Algorithm::HS256);
        assert_eq!(settings.access_token_expiry, 3600);
        assert_eq!(settings.refresh_token_expiry, 604800);
    }

    #[test]
    fn test_missing_secret_fails_in_production() {
        let mut raw = raw_settings();
        raw.refresh_secret = None;

        let result = raw.resolve(Environment::Production);
        assert!(matches!(result, Err(ConfigError::MissingRequired(_))));
    }

    #[test]
    fn test_missing_secret_is_generated_locally() {
        let mut raw = raw_settings();
        raw.access_secret = None;
        raw.refresh_secret = Some(String::new());

        let settings = raw.resolve(Environment::Local).unwrap();
        assert_eq!(settings.access_secret.len(), GENERATED_SECRET_LENGTH);
        assert_ne!(settings.access_secret, settings.refresh_secret);
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let mut raw = raw_settings();
        raw.refresh_secret = raw.access_secret.clone();

        assert!(matches!(
            raw.resolve(Environment::Local),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut raw = raw_settings();
        raw.access_secret = Some("short".to_string());

        assert!(raw.resolve(Environment::Local).is_err());
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        let mut raw = raw_settings();
        raw.algorithm = "RS256".to_string();

        assert!(raw.resolve(Environment::Local).is_err());
    }

    #[test]
    fn test_non_positive_expiry_rejected() {
        let mut raw = raw_settings();
        raw.access_token_expiry = 0;

        assert!(raw.resolve(Environment::Local).is_err());
    }
}
