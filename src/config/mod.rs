pub mod rate_limits;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::config::rate_limits::RateLimits;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub redis_url: String,
    pub database: DatabaseConfig,
    pub tokens: TokenConfig,
    pub rate_limits: RateLimits,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    /// `None` when `DB_IDLE_TIMEOUT_SECONDS` is 0.
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Duration,
}

#[derive(Clone)]
pub struct TokenConfig {
    pub admin_token: Option<String>,
    pub access_key: [u8; 32],
    pub access_ttl_minutes: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("access_key", &"<redacted>")
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr: SocketAddr = env_or_parse("HTTP_ADDR", "0.0.0.0:8080")?;

        Ok(Self {
            http_addr,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            database: DatabaseConfig::from_env()?,
            tokens: TokenConfig::from_env()?,
            rate_limits: RateLimits::from_env()?,
        })
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let idle_seconds: u64 = env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?;

        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            connect_timeout: Duration::from_secs(env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?),
            idle_timeout: (idle_seconds > 0).then(|| Duration::from_secs(idle_seconds)),
            max_lifetime: Duration::from_secs(env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?),
        })
    }
}

impl TokenConfig {
    fn from_env() -> Result<Self> {
        let admin_token = std::env::var("ADMIN_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let access_key = env_required("PASETO_ACCESS_KEY")
            .and_then(|value| decode_key_32("PASETO_ACCESS_KEY", &value))?;

        Ok(Self {
            admin_token,
            access_key,
            access_ttl_minutes: env_or_parse("ACCESS_TTL_MINUTES", "60")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {}", key))
}

pub(crate) fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    env_or(key, default)
        .trim()
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

/// Decodes a base64 value that must hold exactly 32 bytes.
pub fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;

    <[u8; 32]>::try_from(decoded.as_slice())
        .map_err(|_| anyhow!("invalid {}: expected 32 bytes, got {}", key, decoded.len()))
}
