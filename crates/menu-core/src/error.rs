//! Domain errors

use thiserror::Error;

use menu_shared::{ItemId, SectionId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Destination parent not found: {0}")]
    ParentNotFound(ItemId),

    #[error("Section not found: {0}")]
    SectionNotFound(SectionId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Busy: {0}, retry later")]
    Busy(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Only lock contention is worth retrying; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ItemNotFound(_) | Self::ParentNotFound(_) | Self::SectionNotFound(_)
        )
    }

    /// Stable machine-readable code for callers that branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ItemNotFound(_) | Self::ParentNotFound(_) | Self::SectionNotFound(_) => "NOT_FOUND",
            Self::InvalidArgument(_) | Self::ValidationError(_) => "INVALID_ARGUMENT",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::Busy(_) => "BUSY",
            Self::StorageFailure(_) => "STORAGE_FAILURE",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::ValidationError(errors.to_string())
    }
}
