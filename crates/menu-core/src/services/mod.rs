//! Domain services (tree mutation engine)

pub mod traversal;
pub mod serializer;
pub mod move_service;
pub mod sort_service;
pub mod upsert_service;
pub mod engine;

pub use engine::{spawn_revalidation, EngineOptions, MenuTreeEngine};
pub use move_service::MoveState;
pub use traversal::{subtree_of, would_create_cycle, Subtree};
