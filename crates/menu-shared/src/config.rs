//! Configuration management

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AppError;
use crate::constants::{
    DEFAULT_CACHE_KEY, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_MAX_TREE_DEPTH, DEFAULT_STALE_CHANNEL,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub redis: Option<RedisSettings>,
    pub engine: EngineSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub env: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    /// Process-local store; only valid for a single-writer deployment.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub lock_timeout_ms: u64,
    pub max_tree_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

fn default_cache_key() -> String {
    DEFAULT_CACHE_KEY.to_string()
}

fn default_channel() -> String {
    DEFAULT_STALE_CHANNEL.to_string()
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Config::builder()
            .set_default("app.env", "development")?
            .set_default("app.name", "menu-admin")?
            .set_default("database.backend", "postgres")?
            .set_default("database.max_connections", 5)?
            .set_default("database.acquire_timeout_secs", 3)?
            .set_default("engine.lock_timeout_ms", DEFAULT_LOCK_TIMEOUT_MS)?
            .set_default("engine.max_tree_depth", DEFAULT_MAX_TREE_DEPTH as u64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::default().separator("__").try_parsing(true))
            .build()?;
        config.try_deserialize()
    }

    /// Connection string for the postgres backend.
    pub fn database_url(&self) -> Result<&str, AppError> {
        match self.database.backend {
            DatabaseBackend::Postgres if self.database.url.trim().is_empty() => {
                Err(AppError::MissingSetting("database.url"))
            }
            DatabaseBackend::Postgres => Ok(self.database.url.as_str()),
            DatabaseBackend::Memory => Err(AppError::UnsupportedBackend("memory".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let engine = EngineSettings::default();
        assert_eq!(engine.lock_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS);
        assert_eq!(engine.max_tree_depth, DEFAULT_MAX_TREE_DEPTH);
    }

    fn config_with(backend: DatabaseBackend, url: &str) -> AppConfig {
        AppConfig {
            app: AppSettings { env: "test".into(), name: "menu-admin".into() },
            database: DatabaseSettings {
                backend,
                url: url.into(),
                max_connections: 1,
                acquire_timeout_secs: 1,
            },
            redis: None,
            engine: EngineSettings::default(),
        }
    }

    #[test]
    fn test_database_url_requires_postgres_and_value() {
        let cfg = config_with(DatabaseBackend::Postgres, "postgres://localhost/menu");
        assert_eq!(cfg.database_url().unwrap(), "postgres://localhost/menu");
        assert!(matches!(
            config_with(DatabaseBackend::Postgres, " ").database_url(),
            Err(AppError::MissingSetting("database.url"))
        ));
        assert!(matches!(
            config_with(DatabaseBackend::Memory, "").database_url(),
            Err(AppError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_backend_deserializes_lowercase() {
        let cfg = Config::builder()
            .set_default("backend", "memory")
            .unwrap()
            .set_default("max_connections", 1)
            .unwrap()
            .set_default("acquire_timeout_secs", 1)
            .unwrap()
            .build()
            .unwrap();
        let settings: DatabaseSettings = cfg.try_deserialize().unwrap();
        assert_eq!(settings.backend, DatabaseBackend::Memory);
        assert!(settings.url.is_empty());
    }
}
