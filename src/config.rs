use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::auth::validation::ValidationRules;

const DEV_SESSION_SECRET: &str = "dev-secret-key-change-in-production";

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Lifetime of a session opened without "remember me".
    pub ttl_minutes: i64,
    /// Lifetime of a remembered session.
    pub remember_days: i64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs on the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub session: SessionConfig,
    pub validation: ValidationRules,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url: normalize_database_url(&url),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
                acquire_timeout_secs: env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS")?.unwrap_or(30),
            }),
            _ => None,
        };

        let secret = match std::env::var("SESSION_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ if database.is_some() => {
                anyhow::bail!("SESSION_SECRET must be set when DATABASE_URL is configured")
            }
            _ => {
                warn!("SESSION_SECRET not set; using the development secret");
                DEV_SESSION_SECRET.to_string()
            }
        };

        let session = SessionConfig {
            secret,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "taskdock".into()),
            audience: std::env::var("SESSION_AUDIENCE")
                .unwrap_or_else(|_| "taskdock-users".into()),
            ttl_minutes: env_parse("SESSION_TTL_MINUTES")?.unwrap_or(60 * 24),
            remember_days: env_parse("SESSION_REMEMBER_DAYS")?.unwrap_or(30),
            cookie_secure: env_parse("SESSION_COOKIE_SECURE")?.unwrap_or(false),
        };

        let defaults = ValidationRules::default();
        let validation = ValidationRules {
            min_password_length: env_parse("PASSWORD_MIN_LENGTH")?
                .unwrap_or(defaults.min_password_length),
            require_confirmation: env_parse("PASSWORD_REQUIRE_CONFIRMATION")?
                .unwrap_or(defaults.require_confirmation),
        };

        Ok(Self {
            database,
            session,
            validation,
        })
    }

    /// Configuration used by tests and the in-memory fake state.
    pub fn for_tests() -> Self {
        Self {
            database: None,
            session: SessionConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 30,
                remember_days: 30,
                cookie_secure: false,
            },
            validation: ValidationRules::default(),
        }
    }
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => {
            let parsed = v
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}", key))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Hosted Postgres providers hand out `postgres://` URLs; both schemes are
/// accepted, the canonical one is used.
fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{}", rest),
        None => url.to_string(),
    }
}
