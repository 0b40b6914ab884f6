// ============================================================================
// Menu Infrastructure - Redis Revalidator
// File: crates/menu-infrastructure/src/cache/redis_revalidator.rs
// Description: Drops the cached menu and announces it on a pub/sub channel
// ============================================================================

use async_trait::async_trait;
use deadpool_redis::redis::{self, RedisError};
use deadpool_redis::{Config, CreatePoolError, Pool, PoolError, Runtime};
use thiserror::Error;
use tracing::{debug, info};

use menu_core::error::DomainError;
use menu_core::repositories::MenuRevalidator;
use menu_shared::config::RedisSettings;

/// Payload published on the stale channel.
pub const STALE_MESSAGE: &str = "stale";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis pool could not be created: {0}")]
    Create(#[from] CreatePoolError),

    #[error("Redis connection unavailable: {0}")]
    Pool(#[from] PoolError),

    #[error("Redis command failed: {0}")]
    Command(#[from] RedisError),
}

impl From<CacheError> for DomainError {
    fn from(err: CacheError) -> Self {
        DomainError::StorageFailure(err.to_string())
    }
}

pub struct RedisRevalidator {
    pool: Pool,
    cache_key: String,
    channel: String,
}

impl RedisRevalidator {
    pub fn new(pool: Pool, cache_key: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            pool,
            cache_key: cache_key.into(),
            channel: channel.into(),
        }
    }

    /// Build the pool lazily; no connection is made until the first notification.
    pub fn from_settings(settings: &RedisSettings) -> Result<Self, CacheError> {
        let pool = Config::from_url(settings.url.clone()).create_pool(Some(Runtime::Tokio1))?;
        info!(
            cache_key = %settings.cache_key,
            channel = %settings.channel,
            "Redis revalidator configured"
        );
        Ok(Self::new(pool, settings.cache_key.clone(), settings.channel.clone()))
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn invalidate(&self) -> Result<(i64, i64), CacheError> {
        let mut conn = self.pool.get().await?;

        let deleted: i64 = redis::cmd("DEL")
            .arg(&self.cache_key)
            .query_async(&mut conn)
            .await?;
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(STALE_MESSAGE)
            .query_async(&mut conn)
            .await?;

        Ok((deleted, receivers))
    }
}

#[async_trait]
impl MenuRevalidator for RedisRevalidator {
    async fn menu_stale(&self) -> Result<(), DomainError> {
        let (deleted, receivers) = self.invalidate().await?;
        debug!(deleted, receivers, channel = %self.channel, "Menu marked stale");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> RedisSettings {
        RedisSettings {
            url: url.to_string(),
            cache_key: "menu:tree".to_string(),
            channel: "menu:stale".to_string(),
        }
    }

    #[test]
    fn test_from_settings_keeps_names() {
        let revalidator = RedisRevalidator::from_settings(&settings("redis://127.0.0.1:6379")).unwrap();
        assert_eq!(revalidator.cache_key(), "menu:tree");
        assert_eq!(revalidator.channel(), "menu:stale");
    }

    #[test]
    fn test_bad_url_is_rejected() {
        assert!(RedisRevalidator::from_settings(&settings("not a url")).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_storage_failure() {
        let revalidator = RedisRevalidator::from_settings(&settings("redis://127.0.0.1:1")).unwrap();
        let err = revalidator.menu_stale().await.unwrap_err();
        assert!(matches!(err, DomainError::StorageFailure(_)));
    }
}
