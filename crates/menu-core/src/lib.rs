//! # Menu Core
//! 
//! Domain entities, ports, and the tree mutation engine for the menu tree.

pub mod domain;
pub mod services;
pub mod repositories;
pub mod error;

// Re-export domain entities
pub use domain::*;
pub use error::DomainError;
pub use services::{EngineOptions, MenuTreeEngine};
