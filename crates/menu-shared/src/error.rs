//! Application error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Unsupported database backend: {0}")]
    UnsupportedBackend(String),

    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
}
