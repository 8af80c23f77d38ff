use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

const DEFAULT_JWT_SECRET: &str = "development-only-secret-change-me-0123456789";
const MIN_SECRET_LEN: usize = 32;
const MAX_LIFETIME_DAYS: u64 = 3650;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: String,
    pub server: HttpConfig,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
    pub rate_limit: RateLimitConfig,
    pub store: StoreConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub access_expiration_minutes: u64,
    pub refresh_expiration_days: u64,
    pub reset_password_expiration_minutes: u64,
    pub verify_email_expiration_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub per_second: f64,
    pub burst: u32,
    pub idle_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    Memory,
    Mongodb,
}

impl FromStr for StoreDriver {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreDriver::Memory),
            "mongodb" | "mongo" => Ok(StoreDriver::Mongodb),
            other => Err(format!("unknown store driver: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub driver: StoreDriver,
    pub mongodb_uri: String,
    pub database_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub from: String,
    pub frontend_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            server: HttpConfig::default(),
            jwt: JwtConfig::default(),
            password: PasswordConfig::default(),
            rate_limit: RateLimitConfig::default(),
            store: StoreConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_JWT_SECRET.to_string(),
            access_expiration_minutes: 30,
            refresh_expiration_days: 30,
            reset_password_expiration_minutes: 15,
            verify_email_expiration_minutes: 15,
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_second: 5.0,
            burst: 20,
            idle_seconds: 600,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::Memory,
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            database_name: "identity".to_string(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            from: "no-reply@example.com".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

impl JwtConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_expiration_minutes.saturating_mul(60))
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_expiration_days.saturating_mul(24 * 3600))
    }

    pub fn reset_password_ttl(&self) -> Duration {
        Duration::from_secs(self.reset_password_expiration_minutes.saturating_mul(60))
    }

    pub fn verify_email_ttl(&self) -> Duration {
        Duration::from_secs(self.verify_email_expiration_minutes.saturating_mul(60))
    }

    /// Every lifetime must be non-zero and at most `MAX_LIFETIME_DAYS`.
    fn validate_lifetimes(&self) -> Result<()> {
        let max_minutes = MAX_LIFETIME_DAYS * 24 * 60;
        let lifetimes = [
            ("access_expiration_minutes", self.access_expiration_minutes, max_minutes),
            ("refresh_expiration_days", self.refresh_expiration_days, MAX_LIFETIME_DAYS),
            (
                "reset_password_expiration_minutes",
                self.reset_password_expiration_minutes,
                max_minutes,
            ),
            (
                "verify_email_expiration_minutes",
                self.verify_email_expiration_minutes,
                max_minutes,
            ),
        ];

        for (name, value, max) in lifetimes {
            if value == 0 || value > max {
                return Err(AppError::Config(format!(
                    "jwt.{name} = {value} is outside 1..={max}"
                )));
            }
        }
        Ok(())
    }
}

impl RateLimitConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_seconds)
    }
}

fn env_value<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("invalid value for {key}: {e}"))),
        _ => Ok(None),
    }
}

fn override_with<T>(target: &mut T, key: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = env_value(key)? {
        *target = value;
    }
    Ok(())
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = AppConfig::default();

        override_with(&mut config.env, "APP_ENV")?;
        override_with(&mut config.server.host, "SERVER_HOST")?;
        override_with(&mut config.server.port, "SERVER_PORT")?;

        override_with(&mut config.jwt.secret, "JWT_SECRET")?;
        override_with(&mut config.jwt.access_expiration_minutes, "JWT_ACCESS_EXPIRATION_MINUTES")?;
        override_with(&mut config.jwt.refresh_expiration_days, "JWT_REFRESH_EXPIRATION_DAYS")?;
        override_with(
            &mut config.jwt.reset_password_expiration_minutes,
            "JWT_RESET_PASSWORD_EXPIRATION_MINUTES",
        )?;
        override_with(
            &mut config.jwt.verify_email_expiration_minutes,
            "JWT_VERIFY_EMAIL_EXPIRATION_MINUTES",
        )?;

        override_with(&mut config.password.bcrypt_cost, "BCRYPT_COST")?;

        override_with(&mut config.rate_limit.enabled, "RATE_LIMIT_ENABLED")?;
        override_with(&mut config.rate_limit.per_second, "RATE_LIMIT_PER_SECOND")?;
        override_with(&mut config.rate_limit.burst, "RATE_LIMIT_BURST")?;
        override_with(&mut config.rate_limit.idle_seconds, "RATE_LIMIT_IDLE_SECONDS")?;

        override_with(&mut config.store.driver, "STORE_DRIVER")?;
        override_with(&mut config.store.mongodb_uri, "MONGODB_URI")?;
        override_with(&mut config.store.database_name, "DATABASE_NAME")?;

        if let Some(url) = env_value::<String>("MAIL_RELAY_URL")? {
            config.mail.relay_url = Some(url);
        }
        override_with(&mut config.mail.from, "EMAIL_FROM")?;
        override_with(&mut config.mail.frontend_url, "FRONTEND_URL")?;

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "JWT secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.is_production() && self.jwt.secret == DEFAULT_JWT_SECRET {
            return Err(AppError::Config(
                "JWT secret must be set explicitly in production".to_string(),
            ));
        }
        self.jwt.validate_lifetimes()?;
        if !(4..=31).contains(&self.password.bcrypt_cost) {
            return Err(AppError::Config(format!(
                "bcrypt cost {} is outside 4..=31",
                self.password.bcrypt_cost
            )));
        }
        if self.rate_limit.burst == 0 || self.rate_limit.per_second <= 0.0 {
            return Err(AppError::Config(
                "rate limit burst and rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.jwt.access_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(config.jwt.refresh_ttl(), Duration::from_secs(30 * 24 * 3600));
        assert_eq!(config.rate_limit.burst, 20);
        assert_eq!(config.store.driver, StoreDriver::Memory);
        assert!(config.mail.relay_url.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
env = "production"

[jwt]
secret = "a-production-secret-that-is-long-enough"
access_expiration_minutes = 5

[rate_limit]
per_second = 2.5
burst = 10

[store]
driver = "mongodb"
database_name = "accounts"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert!(config.is_production());
        assert_eq!(config.jwt.access_ttl(), Duration::from_secs(300));
        assert_eq!(config.jwt.refresh_expiration_days, 30);
        assert_eq!(config.rate_limit.per_second, 2.5);
        assert_eq!(config.store.driver, StoreDriver::Mongodb);
        assert_eq!(config.store.database_name, "accounts");
        assert_eq!(config.server.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_default_secret_in_production() {
        let config = AppConfig {
            env: "production".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_secret() {
        let mut config = AppConfig::default();
        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_lifetimes() {
        let mut config = AppConfig::default();
        config.jwt.access_expiration_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.jwt.refresh_expiration_days = 100_000_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.jwt.verify_email_expiration_minutes = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.jwt.refresh_expiration_days = MAX_LIFETIME_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_bcrypt_cost() {
        let mut config = AppConfig::default();
        config.password.bcrypt_cost = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_driver_parse() {
        assert_eq!("Mongo".parse::<StoreDriver>(), Ok(StoreDriver::Mongodb));
        assert_eq!("memory".parse::<StoreDriver>(), Ok(StoreDriver::Memory));
        assert!("sqlite".parse::<StoreDriver>().is_err());
    }
}
