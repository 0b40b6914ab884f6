//! Wire config into a store, a revalidator, and the engine.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use menu_core::repositories::{MenuRevalidator, MenuStore, NoopRevalidator};
use menu_core::{EngineOptions, MenuTreeEngine};
use menu_infrastructure::{create_pool, run_migrations, InMemoryMenuStore, PgMenuStore, RedisRevalidator};
use menu_shared::config::{AppConfig, DatabaseBackend};

pub async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn MenuStore>> {
    match config.database.backend {
        DatabaseBackend::Postgres => {
            let pool = create_pool(
                config.database_url()?,
                config.database.max_connections,
                config.database.acquire_timeout_secs,
            )
            .await
            .context("Failed to connect to PostgreSQL")?;
            info!("Connected to PostgreSQL");
            Ok(Arc::new(PgMenuStore::new(pool, config.engine.lock_timeout_ms)))
        }
        DatabaseBackend::Memory => {
            warn!("Using the in-memory store; nothing outlives this process");
            Ok(Arc::new(InMemoryMenuStore::from_settings(&config.engine)))
        }
    }
}

pub fn build_revalidator(config: &AppConfig) -> anyhow::Result<Arc<dyn MenuRevalidator>> {
    match &config.redis {
        Some(settings) => Ok(Arc::new(
            RedisRevalidator::from_settings(settings).context("Failed to configure Redis")?,
        )),
        None => {
            info!("Redis not configured; cache revalidation disabled");
            Ok(Arc::new(NoopRevalidator))
        }
    }
}

pub async fn build_engine(config: &AppConfig) -> anyhow::Result<MenuTreeEngine> {
    let store = build_store(config).await?;
    let revalidator = build_revalidator(config)?;
    info!(backend = store.backend_name(), "Menu engine ready");
    Ok(MenuTreeEngine::new(store, revalidator, EngineOptions::from(&config.engine)))
}

pub async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool = create_pool(
        config.database_url()?,
        config.database.max_connections,
        config.database.acquire_timeout_secs,
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;
    info!("Migrations applied");
    Ok(())
}
