//! Central module for application-wide configuration settings.
//!
//! Loads the database, server, token, lockout and hashing parameters from
//! environment variables once at process start and validates them. The
//! auth core only ever sees the resulting [`AuthSettings`].

use crate::services::password::{MAX_COST, MIN_COST};
use anyhow::{Context, Result, bail};
use chrono::Duration;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub server_port: u16,
    pub auth: AuthSettings,
    pub mail: MailSettings,
}

/// Outgoing mail for password-reset and verification links. Without
/// `SMTP_HOST` the server falls back to writing links to the log.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_name: String,
    pub from_email: String,
    pub base_url: String,
}

/// Tunables for the auth core.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub max_login_attempts: u32,
    pub lock_duration: Duration,
    pub bcrypt_cost: u32,
    pub password_reset_ttl: Duration,
    pub email_verification_ttl: Duration,
    /// Take the client address for login history from `X-Forwarded-For`.
    /// Only safe behind a reverse proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

/// Upper bound for every configured lifetime; keeps `now + ttl` in range.
pub const MAX_LIFETIME_DAYS: i64 = 3650;

impl AuthSettings {
    /// Settings with the documented defaults and the given secrets.
    pub fn with_secrets(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access_token_secret: access.into(),
            refresh_token_secret: refresh.into(),
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            max_login_attempts: 5,
            lock_duration: Duration::hours(2),
            bcrypt_cost: 12,
            password_reset_ttl: Duration::minutes(10),
            email_verification_ttl: Duration::hours(24),
            trust_forwarded_for: false,
        }
    }

    /// Checks the invariants the core relies on.
    pub fn validate(&self) -> Result<()> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            bail!("token secrets must not be empty");
        }
        if self.access_token_secret == self.refresh_token_secret {
            bail!("JWT_SECRET and JWT_REFRESH_SECRET must differ");
        }
        let max = Duration::days(MAX_LIFETIME_DAYS);
        let lifetimes = [
            ("JWT_EXPIRE_SECONDS", self.access_token_ttl),
            ("JWT_REFRESH_EXPIRE_SECONDS", self.refresh_token_ttl),
            ("LOCK_TIME_SECONDS", self.lock_duration),
            ("PASSWORD_RESET_EXPIRE_SECONDS", self.password_reset_ttl),
            ("EMAIL_VERIFICATION_EXPIRE_SECONDS", self.email_verification_ttl),
        ];
        for (name, value) in lifetimes {
            if value <= Duration::zero() {
                bail!("{} must be positive", name);
            }
            if value > max {
                bail!("{} must not exceed {} days", name, MAX_LIFETIME_DAYS);
            }
        }
        if self.max_login_attempts == 0 {
            bail!("MAX_LOGIN_ATTEMPTS must be at least 1");
        }
        if !(MIN_COST..=MAX_COST).contains(&self.bcrypt_cost) {
            bail!("BCRYPT_ROUNDS must be between {} and {}", MIN_COST, MAX_COST);
        }
        Ok(())
    }
}

fn var_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("{} has an invalid value", name))
}

fn parse_seconds(name: &str, raw: &str) -> Result<Duration> {
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a whole number of seconds", name))?;
    Duration::try_seconds(secs).with_context(|| format!("{} is out of range", name))
}

fn seconds_var(name: &str, default: &str) -> Result<Duration> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_seconds(name, &raw)
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let max_connections = var_or::<u32>("DB_MAX_CONNECTIONS", "5")?;
        let acquire_timeout_seconds = var_or::<u64>("DB_ACQUIRE_TIMEOUT_SECONDS", "3")?;
        let server_port = var_or::<u16>("SERVER_PORT", "3000")?;

        let access_token_secret = env::var("JWT_SECRET").context("JWT_SECRET not set")?;
        let refresh_token_secret =
            env::var("JWT_REFRESH_SECRET").context("JWT_REFRESH_SECRET not set")?;

        let auth = AuthSettings {
            access_token_secret,
            refresh_token_secret,
            access_token_ttl: seconds_var("JWT_EXPIRE_SECONDS", "900")?,
            refresh_token_ttl: seconds_var("JWT_REFRESH_EXPIRE_SECONDS", "604800")?,
            max_login_attempts: var_or("MAX_LOGIN_ATTEMPTS", "5")?,
            lock_duration: seconds_var("LOCK_TIME_SECONDS", "7200")?,
            bcrypt_cost: var_or("BCRYPT_ROUNDS", "12")?,
            password_reset_ttl: seconds_var("PASSWORD_RESET_EXPIRE_SECONDS", "600")?,
            email_verification_ttl: seconds_var("EMAIL_VERIFICATION_EXPIRE_SECONDS", "86400")?,
            trust_forwarded_for: var_or("TRUST_PROXY_HEADERS", "false")?,
        };
        auth.validate().context("invalid auth configuration")?;

        let mail = MailSettings {
            smtp_host: env::var("SMTP_HOST").ok().filter(|h| !h.trim().is_empty()),
            smtp_port: var_or("SMTP_PORT", "587")?,
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_name: env::var("MAIL_FROM_NAME").unwrap_or_else(|_| "Storefront".to_string()),
            from_email: env::var("MAIL_FROM_EMAIL")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", server_port)),
        };

        Ok(Config {
            database_url,
            max_connections,
            acquire_timeout_seconds,
            server_port,
            auth,
            mail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy() {
        let settings = AuthSettings::with_secrets("access", "refresh");
        assert_eq!(settings.access_token_ttl, Duration::minutes(15));
        assert_eq!(settings.refresh_token_ttl, Duration::days(7));
        assert_eq!(settings.max_login_attempts, 5);
        assert_eq!(settings.lock_duration, Duration::hours(2));
        assert_eq!(settings.bcrypt_cost, 12);
        assert!(!settings.trust_forwarded_for);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let settings = AuthSettings::with_secrets("same", "same");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_out_of_range_cost_rejected() {
        let mut settings = AuthSettings::with_secrets("a", "b");
        settings.bcrypt_cost = 2;
        assert!(settings.validate().is_err());
        settings.bcrypt_cost = 4;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut settings = AuthSettings::with_secrets("a", "b");
        settings.max_login_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_huge_second_counts_are_errors_not_panics() {
        assert!(parse_seconds("JWT_EXPIRE_SECONDS", "9223372036854775807").is_err());
        assert!(parse_seconds("JWT_EXPIRE_SECONDS", "-9223372036854775808").is_err());
        assert!(parse_seconds("JWT_EXPIRE_SECONDS", "15m").is_err());
        assert_eq!(
            parse_seconds("JWT_EXPIRE_SECONDS", " 900 ").unwrap(),
            Duration::minutes(15)
        );
    }

    #[test]
    fn test_lifetimes_are_bounded() {
        let mut settings = AuthSettings::with_secrets("a", "b");
        settings.refresh_token_ttl = Duration::days(MAX_LIFETIME_DAYS + 1);
        assert!(settings.validate().is_err());

        let mut settings = AuthSettings::with_secrets("a", "b");
        settings.lock_duration = Duration::zero();
        assert!(settings.validate().is_err());

        let mut settings = AuthSettings::with_secrets("a", "b");
        settings.password_reset_ttl = Duration::seconds(-1);
        assert!(settings.validate().is_err());
    }
}
