pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use crate::config::rate_limits::RateLimits;
use crate::config::AppConfig;
use crate::infra::{cache::RedisCache, db::Db};

/// Shared handles cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub cache: RedisCache,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub rate_limits: RateLimits,
}

impl AppState {
    pub fn new(config: &AppConfig, db: Db, cache: RedisCache) -> Self {
        let tokens = &config.tokens;
        Self {
            db,
            cache,
            admin_token: tokens.admin_token.clone(),
            paseto_access_key: tokens.access_key,
            access_ttl_minutes: tokens.access_ttl_minutes,
            rate_limits: config.rate_limits,
        }
    }

    /// Connects postgres and redis from the loaded configuration.
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let db = Db::connect(&config.database).await?;
        let cache = RedisCache::connect(&config.redis_url).await?;
        Ok(Self::new(config, db, cache))
    }
}
