//! Cache revalidation port

use async_trait::async_trait;

use crate::error::DomainError;

/// Told once after every committed mutation that cached menu views are stale.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MenuRevalidator: Send + Sync {
    async fn menu_stale(&self) -> Result<(), DomainError>;
}

/// Used when no cache is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRevalidator;

#[async_trait]
impl MenuRevalidator for NoopRevalidator {
    async fn menu_stale(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
